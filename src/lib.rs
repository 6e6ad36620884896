//! Polling client of the `IoTaWatt` energy monitor.

pub mod api;
pub mod device;
pub mod error;
pub mod iotawatt;
mod prelude;
pub mod query;
pub mod reconciler;
pub mod sensor;
pub mod sensors;

pub use crate::{
    api::{Credentials, HttpTransport, Transport},
    device::Authentication,
    error::Error,
    iotawatt::{Config, DEFAULT_TIME_SPAN, Iotawatt},
    prelude::Result,
    query::TimeAnchor,
    sensor::{Channel, IoType, Sensor, Unit},
    sensors::Sensors,
};
