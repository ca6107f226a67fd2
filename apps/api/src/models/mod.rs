//! Database models for the session store

pub mod acquisition;
pub mod play_state;
pub mod playlist;
pub mod queue;
pub mod track;
pub mod vote;

pub use acquisition::{retry_delay, AcquisitionJob};
pub use play_state::PlayStateRow;
pub use playlist::Playlist;
pub use queue::{MoveDirection, PoolEntry, PoolItemRow, QueueEntry, QueueItemRow};
pub use track::{parse_source_ref, SourceRefError, Track, TrackMetadata};
pub use vote::{pick_winner, sample_options, tally, VoteRound};
