//! API response types shared by the route handlers

pub mod response;

pub use response::{Accepted, Attachment, Created, ListResponse, NoContent};
