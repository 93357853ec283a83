pub mod access;
pub mod connection;
pub mod dispatcher;
