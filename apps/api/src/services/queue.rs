//! Queue and pool management

use erwin_protocol::{PoolItem, QueueItem, QueueSource, QueueUpdate, ServerMessage};
use uuid::Uuid;

use super::playback::pool_update;
use crate::error::{ApiError, ApiResult};
use crate::models::MoveDirection;
use crate::repositories::{pool, queue, tracks};
use crate::state::AppContext;

#[derive(Clone)]
pub struct QueueService {
    ctx: AppContext,
}

impl QueueService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self) -> ApiResult<Vec<QueueItem>> {
        let mut conn = self.ctx.db.acquire().await?;
        Ok(queue::list(&mut conn).await?)
    }

    pub async fn pool(&self) -> ApiResult<Vec<PoolItem>> {
        let mut conn = self.ctx.db.acquire().await?;
        Ok(pool::list(&mut conn).await?)
    }

    /// Append a track to the tail. A pooled track leaves the pool.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(&self, track_id: Uuid, source: QueueSource) -> ApiResult<Vec<QueueItem>> {
        let mut tx = self.ctx.db.begin().await?;
        let track = tracks::find(&mut tx, track_id)
            .await?
            .ok_or_else(|| ApiError::not_found("track", track_id))?;
        if track.disabled {
            return Err(ApiError::ValidationError(format!(
                "track {} is disabled",
                track.label()
            )));
        }

        queue::append(&mut tx, track_id, source, self.ctx.clock.now()).await?;
        let left_pool = pool::remove_track(&mut tx, track_id).await?;
        let items = queue::list(&mut tx).await?;
        let pool_event = if left_pool {
            Some(pool_update(&mut tx).await?)
        } else {
            None
        };
        tx.commit().await?;

        tracing::info!(track_id = %track_id, source = ?source, "Track queued");
        self.ctx.hub.publish(ServerMessage::QueueUpdate(QueueUpdate {
            queue: items.clone(),
        }));
        if let Some(event) = pool_event {
            self.ctx.hub.publish(event);
        }
        Ok(items)
    }

    /// Swap an entry with its neighbour. Moving past either end is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn move_entry(
        &self,
        entry_id: Uuid,
        direction: MoveDirection,
    ) -> ApiResult<Vec<QueueItem>> {
        let mut tx = self.ctx.db.begin().await?;
        let entry = queue::find(&mut tx, entry_id)
            .await?
            .ok_or_else(|| ApiError::not_found("queue entry", entry_id))?;

        let moved = match queue::find_at(&mut tx, direction.neighbour(entry.position)).await? {
            Some(other) => {
                queue::swap(&mut tx, &entry, &other).await?;
                true
            }
            None => false,
        };
        let items = queue::list(&mut tx).await?;
        tx.commit().await?;

        if moved {
            self.ctx.hub.publish(ServerMessage::QueueUpdate(QueueUpdate {
                queue: items.clone(),
            }));
        }
        Ok(items)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, entry_id: Uuid) -> ApiResult<Vec<QueueItem>> {
        let mut tx = self.ctx.db.begin().await?;
        if !queue::delete(&mut tx, entry_id).await? {
            return Err(ApiError::not_found("queue entry", entry_id));
        }
        let items = queue::list(&mut tx).await?;
        tx.commit().await?;

        self.ctx.hub.publish(ServerMessage::QueueUpdate(QueueUpdate {
            queue: items.clone(),
        }));
        Ok(items)
    }
}
