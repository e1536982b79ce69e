mod archive;
mod catalog;
mod lock;
mod scorer;
