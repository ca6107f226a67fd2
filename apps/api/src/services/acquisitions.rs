//! Acquisition requests
//!
//! Requests only enqueue work; the acquisition job does the fetching.

use erwin_protocol::ServerMessage;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{parse_source_ref, track::source_url, AcquisitionJob};
use crate::repositories::{acquisition, playlists, tracks};
use crate::state::AppContext;

#[derive(Clone)]
pub struct AcquisitionService {
    ctx: AppContext,
}

impl AcquisitionService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Enqueue a fetch for a media link, reusing the track when the same
    /// source was requested before.
    #[tracing::instrument(skip(self))]
    pub async fn request(&self, url: &str, playlist_id: Option<Uuid>) -> ApiResult<AcquisitionJob> {
        let source_ref =
            parse_source_ref(url).map_err(|e| ApiError::ValidationError(e.to_string()))?;

        let mut tx = self.ctx.db.begin().await?;
        if let Some(id) = playlist_id {
            if !playlists::exists(&mut tx, id).await? {
                return Err(ApiError::not_found("playlist", id));
            }
        }

        let now = self.ctx.clock.now();
        let track = match tracks::find_by_source_ref(&mut tx, &source_ref).await? {
            Some(track) => track,
            None => tracks::insert(&mut tx, &source_ref, &source_url(&source_ref), now).await?,
        };
        let job = acquisition::insert(&mut tx, track.id, playlist_id, now).await?;
        tx.commit().await?;

        tracing::info!(
            job_id = %job.id,
            track_id = %track.id,
            source_ref = %source_ref,
            "Acquisition requested"
        );
        self.ctx
            .hub
            .publish(ServerMessage::DownloadUpdate(job.to_update()));
        Ok(job)
    }

    pub async fn list(&self) -> ApiResult<Vec<AcquisitionJob>> {
        let mut conn = self.ctx.db.acquire().await?;
        Ok(acquisition::list(&mut conn, acquisition::DEFAULT_LIST_LIMIT).await?)
    }

    /// Drop jobs in a final or failed state.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> ApiResult<u64> {
        let mut conn = self.ctx.db.acquire().await?;
        let removed = acquisition::clear_finished(&mut conn).await?;
        tracing::info!(removed, "Cleared finished acquisition jobs");
        Ok(removed)
    }
}
