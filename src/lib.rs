pub mod backend;
pub mod config;
pub mod counter;
pub mod error;
pub mod metrics;
pub mod mmap_area;
pub mod packet;
pub mod pcap_backend;
pub mod raw_socket;
pub mod report;
pub mod ring;
pub mod ring_backend;
pub mod scratch;
pub mod socket_backend;
pub mod tpacket;
pub mod worker;

mod util;

pub use backend::{Backend, Capture};
pub use config::Config;
pub use error::{Error, Result};
