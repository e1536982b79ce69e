mod round_trip;
mod urls;
