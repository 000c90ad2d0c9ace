pub mod request;
pub mod response;

pub use request::{ParseError, ParseOutcome, Processor};
pub use response::{ResponseOutcome, ResponseWriter};
