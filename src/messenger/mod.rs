//! Messenger facade funneling outbound sends through the pacer.
//!
//! Every collaborator that sends messages goes through a [`Messenger`].
//! Built without a pacer it forwards straight to the transport and awaits
//! the result; built with one it wraps each call in a send job, enqueues it,
//! and awaits the ticket. Callers see the same signatures either way.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::PacerConfig;
use crate::error::Result;
use crate::scheduler::{QueueMetrics, SendJob, SendPacer};
use crate::transport::{ChatId, Delivery, InputMedia, MediaRef, SendOptions, Transport};

/// Entry point for all outbound sends.
pub struct Messenger {
    transport: Arc<dyn Transport>,
    pacer: Option<Arc<SendPacer>>,
}

impl Messenger {
    /// Messenger without pacing: every send forwards directly.
    pub fn direct(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pacer: None,
        }
    }

    /// Messenger routing every send through `pacer`.
    pub fn with_pacer(transport: Arc<dyn Transport>, pacer: Arc<SendPacer>) -> Self {
        Self {
            transport,
            pacer: Some(pacer),
        }
    }

    /// Build from configuration, honoring the `enabled` flag.
    ///
    /// The pacer (when one is built) still needs [`SendPacer::start`];
    /// fetch it via [`Messenger::pacer`] during bootstrap.
    pub fn from_config(transport: Arc<dyn Transport>, config: &PacerConfig) -> Self {
        if config.enabled {
            let pacer = Arc::new(SendPacer::new(transport.clone(), config.clone()));
            Self::with_pacer(transport, pacer)
        } else {
            Self::direct(transport)
        }
    }

    /// The pacer behind this messenger, if sends are paced.
    pub fn pacer(&self) -> Option<&Arc<SendPacer>> {
        self.pacer.as_ref()
    }

    /// True when sends are routed through a pacer.
    pub fn is_paced(&self) -> bool {
        self.pacer.is_some()
    }

    /// Backlog metrics, absent when running without a pacer.
    pub fn queue_metrics(&self) -> Option<QueueMetrics> {
        self.pacer.as_ref().map(|pacer| pacer.queue_metrics())
    }

    /// Queue a text message for delivery.
    pub async fn send_text(
        &self,
        chat_id: ChatId,
        text: impl Into<String>,
        opts: SendOptions,
        context: Option<serde_json::Value>,
    ) -> Result<Delivery> {
        let text = text.into();
        let transport = self.transport.clone();
        let chat = chat_id.clone();
        let job: SendJob = Arc::new(move || {
            let transport = transport.clone();
            let chat = chat.clone();
            let text = text.clone();
            let opts = opts.clone();
            Box::pin(async move { transport.send_message(&chat, &text, &opts).await }) as BoxFuture<'static, Result<Delivery>>
        });
        self.dispatch(chat_id, context, job).await
    }

    /// Queue a photo for delivery.
    pub async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: MediaRef,
        opts: SendOptions,
        context: Option<serde_json::Value>,
    ) -> Result<Delivery> {
        let transport = self.transport.clone();
        let chat = chat_id.clone();
        let job: SendJob = Arc::new(move || {
            let transport = transport.clone();
            let chat = chat.clone();
            let photo = photo.clone();
            let opts = opts.clone();
            Box::pin(async move { transport.send_photo(&chat, &photo, &opts).await }) as BoxFuture<'static, Result<Delivery>>
        });
        self.dispatch(chat_id, context, job).await
    }

    /// Queue a document for delivery.
    pub async fn send_document(
        &self,
        chat_id: ChatId,
        document: MediaRef,
        opts: SendOptions,
        context: Option<serde_json::Value>,
    ) -> Result<Delivery> {
        let transport = self.transport.clone();
        let chat = chat_id.clone();
        let job: SendJob = Arc::new(move || {
            let transport = transport.clone();
            let chat = chat.clone();
            let document = document.clone();
            let opts = opts.clone();
            Box::pin(async move { transport.send_document(&chat, &document, &opts).await }) as BoxFuture<'static, Result<Delivery>>
        });
        self.dispatch(chat_id, context, job).await
    }

    /// Queue a media group for delivery.
    pub async fn send_media_group(
        &self,
        chat_id: ChatId,
        media: Vec<InputMedia>,
        opts: SendOptions,
        context: Option<serde_json::Value>,
    ) -> Result<Delivery> {
        let transport = self.transport.clone();
        let chat = chat_id.clone();
        let job: SendJob = Arc::new(move || {
            let transport = transport.clone();
            let chat = chat.clone();
            let media = media.clone();
            let opts = opts.clone();
            Box::pin(async move { transport.send_media_group(&chat, &media, &opts).await }) as BoxFuture<'static, Result<Delivery>>
        });
        self.dispatch(chat_id, context, job).await
    }

    /// Run a job either directly or via the pacer's queue.
    async fn dispatch(
        &self,
        chat_id: ChatId,
        context: Option<serde_json::Value>,
        job: SendJob,
    ) -> Result<Delivery> {
        match &self.pacer {
            None => (job)().await,
            Some(pacer) => {
                let ticket = pacer.enqueue(job, chat_id, context).await?;
                ticket.wait().await
            }
        }
    }
}
