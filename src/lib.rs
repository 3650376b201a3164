pub mod api;
pub mod catalog;
pub mod contracts;
pub mod label;
pub mod storage;
