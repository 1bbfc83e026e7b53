//! Boolean control surface for UI layers
//!
//! Menu-driven front ends usually only need "did it work". [`VoiceChatControl`]
//! maps each [`CallManager`] operation to a `bool`, logging the typed error
//! instead of returning it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use callcast_audio_core::VoiceSettings;

use crate::coordinator::CallManager;
use crate::errors::SessionResult;
use crate::transport::CallAccount;
use crate::types::ChatId;

#[async_trait]
pub trait VoiceChatControl: Send + Sync {
    async fn join(&self, chat_id: ChatId, account: Arc<dyn CallAccount>) -> bool;
    async fn leave(&self, chat_id: ChatId) -> bool;
    async fn play(&self, chat_id: ChatId, path: &Path, settings: VoiceSettings) -> bool;
    async fn pause(&self, chat_id: ChatId) -> bool;
    async fn resume(&self, chat_id: ChatId) -> bool;
    async fn stop(&self, chat_id: ChatId) -> bool;
    async fn set_volume(&self, chat_id: ChatId, percent: u16) -> bool;
    async fn enqueue(&self, chat_id: ChatId, path: &Path, settings: VoiceSettings) -> bool;
}

fn report<T>(operation: &str, chat_id: ChatId, result: SessionResult<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::info!(%chat_id, operation, error = %e, "operation refused");
            false
        }
    }
}

#[async_trait]
impl VoiceChatControl for CallManager {
    async fn join(&self, chat_id: ChatId, account: Arc<dyn CallAccount>) -> bool {
        report("join", chat_id, CallManager::join(self, chat_id, account).await)
    }

    async fn leave(&self, chat_id: ChatId) -> bool {
        report("leave", chat_id, CallManager::leave(self, chat_id).await)
    }

    async fn play(&self, chat_id: ChatId, path: &Path, settings: VoiceSettings) -> bool {
        report("play", chat_id, CallManager::play(self, chat_id, path, settings).await)
    }

    async fn pause(&self, chat_id: ChatId) -> bool {
        report("pause", chat_id, CallManager::pause(self, chat_id).await)
    }

    async fn resume(&self, chat_id: ChatId) -> bool {
        report("resume", chat_id, CallManager::resume(self, chat_id).await)
    }

    async fn stop(&self, chat_id: ChatId) -> bool {
        report("stop", chat_id, CallManager::stop(self, chat_id).await)
    }

    async fn set_volume(&self, chat_id: ChatId, percent: u16) -> bool {
        report("set_volume", chat_id, CallManager::set_volume(self, chat_id, percent).await)
    }

    async fn enqueue(&self, chat_id: ChatId, path: &Path, settings: VoiceSettings) -> bool {
        report("enqueue", chat_id, CallManager::enqueue(self, chat_id, path, settings).await)
    }
}
