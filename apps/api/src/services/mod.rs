//! Business logic services for erwin
//!
//! Each service owns one family of mutations. A mutation runs as a single
//! transaction that re-reads the authoritative rows, applies the change,
//! commits, and only then publishes events to the hub.

pub mod acquisitions;
pub mod commands;
pub mod playback;
pub mod playlists;
pub mod queue;
pub mod votes;
pub mod ytdlp;

pub use acquisitions::AcquisitionService;
pub use commands::{ChatCommand, CommandReply, CommandService};
pub use playback::PlaybackService;
pub use playlists::PlaylistService;
pub use queue::QueueService;
pub use votes::VoteService;
pub use ytdlp::{AcquisitionOutcome, AcquisitionRequest, AcquisitionTool, AcquiredAsset, YtDlpTool};
