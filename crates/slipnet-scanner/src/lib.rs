//! SlipNet Scanner - Resolver Discovery
//!
//! Finds public DNS resolvers that answer honestly by sending each one a raw
//! A query and checking what comes back.
//!
//! ```text
//! resolver list ──▶ parse_resolver_list ──▶ ResolverScanner
//!                                               │  (semaphore, N at a time)
//!                                   ┌───────────┼───────────┐
//!                                   ▼           ▼           ▼
//!                                 probe       probe       probe   (UDP, 512 B)
//!                                   └───────────┼───────────┘
//!                                               ▼
//!                                  ScanStream (completion order)
//! ```

mod config;
mod dns;
mod error;
mod hosts;
mod probe;
mod result;
mod scanner;

pub use config::ScanConfig;
pub use dns::{
    build_query, first_a_record, parse_response, random_query, DnsCodecError, DnsHeader,
    DnsResponse, MAX_MESSAGE_LEN,
};
pub use error::{ListError, ProbeError, ProbeFailureKind, ScanConfigError};
pub use hosts::{
    is_valid_ipv4, load_resolver_list, parse_resolver_list, RejectedLine, ResolverList,
    ResolverTarget,
};
pub use probe::{classify, is_hijacked, read_answer, Prober, UdpProber};
pub use result::{ResolverScanResult, ScanStatus};
pub use scanner::{ResolverScanner, ScanStream};
