mod client;
pub mod digest;
pub mod models;
pub mod transport;

pub use self::{
    client::HttpTransport,
    transport::{Credentials, Response, Transport},
};
