//! Concrete `DataFeed`/`Broker` implementations (spec §4.T).

pub mod csv_feed;
pub mod paper_broker;
pub mod resilient;

pub use csv_feed::CsvDataFeed;
pub use paper_broker::PaperBroker;
pub use resilient::{ResilientBroker, ResilientDataFeed};
