pub mod client;
pub mod source;
pub mod types;
pub mod xml;

pub use client::{Ec2Client, Ec2Config};
pub use source::SpotPriceSource;
pub use types::{SpotPriceHistoryPage, SpotPriceHistoryRequest, SpotPriceRecord};
