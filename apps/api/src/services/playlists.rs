//! Playlist creation and listing

use crate::error::{ApiError, ApiResult};
use crate::models::playlist::MAX_NAME_LENGTH;
use crate::models::Playlist;
use crate::repositories::playlists;
use crate::state::AppContext;

#[derive(Clone)]
pub struct PlaylistService {
    ctx: AppContext,
}

impl PlaylistService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, name: &str) -> ApiResult<Playlist> {
        let name = validate_name(name)?;
        let mut conn = self.ctx.db.acquire().await?;
        let playlist = playlists::create(&mut conn, name, self.ctx.clock.now()).await?;
        tracing::info!(playlist_id = %playlist.id, name = %playlist.name, "Playlist created");
        Ok(playlist)
    }

    pub async fn list(&self) -> ApiResult<Vec<Playlist>> {
        let mut conn = self.ctx.db.acquire().await?;
        Ok(playlists::list(&mut conn).await?)
    }
}

fn validate_name(name: &str) -> ApiResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::ValidationError(
            "Playlist name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::ValidationError(format!(
            "Playlist name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name)
}
