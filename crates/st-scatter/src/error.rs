
use thiserror::Error;
pub type Result<T> = std::result::Result<T, Error>;
#[derive(Debug, Error)]
pub enum Error {
    #[error("dtype error: {0}")] DType(String),
    #[error("shape error: {0}")] Shape(String),
    #[error("layout error: {0}")] Layout(String),
    #[error("device error: {0}")] Device(String),
    #[error("kernel compile error: {0}")] Compile(String),
    #[error("other: {0}")] Other(String),
}
pub fn dtype(m:&str)->Error{ Error::DType(m.to_string()) }
pub fn shape(m:&str)->Error{ Error::Shape(m.to_string()) }
pub fn layout(m:&str)->Error{ Error::Layout(m.to_string()) }
pub fn device(m:&str)->Error{ Error::Device(m.to_string()) }
pub fn compile(m:&str)->Error{ Error::Compile(m.to_string()) }
pub fn other(m:&str)->Error{ Error::Other(m.to_string()) }
