//! Database repository layer for erwin
//!
//! Every function takes a `&mut SqliteConnection` rather than the pool so
//! callers can compose several of them inside one transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let head = queue::head(&mut tx).await?;
//! play_state::save(&mut tx, &next).await?;
//! tx.commit().await?;
//! ```
//!
//! Nothing in here opens its own transaction or touches the pool, so a
//! caller holding the single writer connection can never deadlock on it.

pub mod acquisition;
pub mod play_state;
pub mod playlists;
pub mod pool;
pub mod queue;
pub mod tracks;
pub mod votes;
