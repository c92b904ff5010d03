mod converter;
mod sink;
mod stats;
#[cfg(test)]
mod tests;

pub use converter::DisplayConverter;
pub use sink::{negotiate, ChannelSink, DisplayFeed, DisplaySink, VideoFormat};
pub use stats::DisplayStats;
