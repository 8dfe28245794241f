#[macro_use]
pub mod logging;
pub mod io;
pub mod settings;

pub use io::serial::{SampleReader, SerialConnector};
pub use io::{IoError, OutputFormat, Sample, SampleSink};
pub use settings::ReceiverSettings;
