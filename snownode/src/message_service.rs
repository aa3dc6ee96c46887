//! Message service implementation
//!
//! Inbound messaging endpoint: records messages without acting on them.

use std::sync::Arc;

use pb::message_service_server::MessageService;
use pb::{MessageRequest, MessageResponse};

use crate::metrics;
use crate::p2p::message::MessageManager;

/// Protocol buffer definitions for the message service
#[allow(clippy::module_inception)]
pub mod pb {
    tonic::include_proto!("message");
}

pub struct MessageServiceSVC {
    messages: Arc<MessageManager>,
}

impl MessageServiceSVC {
    pub fn new(messages: Arc<MessageManager>) -> Self {
        MessageServiceSVC { messages }
    }
}

#[tonic::async_trait]
impl MessageService for MessageServiceSVC {
    async fn receive_message(
        &self,
        request: tonic::Request<MessageRequest>,
    ) -> Result<tonic::Response<MessageResponse>, tonic::Status> {
        metrics::record_metrics("receive_message", || async {
            self.messages.receive_message(request.get_ref());
            Ok(tonic::Response::new(MessageResponse {}))
        })
        .await
    }
}
