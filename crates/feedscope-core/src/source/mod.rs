//! Package sources and feed-type classification.
//!
//! A source is either a local folder or an HTTP feed. Before any provider
//! runs, the repository classifies the source once:
//! - local folders by sniffing their layout (v2, v3, packages.config, unzipped)
//! - HTTP feeds by whether a v3 service index can be read

mod feed_type;
mod spec;

pub use feed_type::{FeedType, FeedTypeProbe, LayoutFeedTypeProbe, detect_local_feed_type};
pub use spec::{Credentials, PackageSource, ProxySettings, SourceAddress, SourceTransport};
