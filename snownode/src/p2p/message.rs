//! Pass-through messaging between peers. Messages are logged with a digest
//! of their payload and never affect consensus decisions.

use std::sync::Mutex;
use std::time::SystemTime;

use sha3::{Digest, Sha3_256};
use tonic::transport::Channel;

use crate::error::NodeError;
use crate::message_service::pb::message_service_client::MessageServiceClient;
use crate::message_service::pb::MessageRequest;

/// Log entry for one sent or received message. Only one of sender and
/// receiver is assigned.
#[allow(dead_code)]
struct MessageLog {
    hash: String,
    message_type: i32,
    sender: String,
    receiver: String,
    time: SystemTime,
}

pub struct MessageManager {
    logs: Mutex<Vec<MessageLog>>,
}

impl MessageManager {
    pub fn new() -> Self {
        MessageManager {
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Sends a message to the peer behind the given connection and records
    /// it in the message log.
    pub async fn send_message(
        &self,
        conn: Channel,
        receiver: &str,
        request: MessageRequest,
    ) -> Result<(), NodeError> {
        let mut client = MessageServiceClient::new(conn);
        client.receive_message(request.clone()).await?;

        self.logs.lock().unwrap().push(MessageLog {
            hash: hash(&request.value),
            message_type: request.r#type,
            sender: String::new(),
            receiver: receiver.to_string(),
            time: SystemTime::now(),
        });
        Ok(())
    }

    /// Records an inbound message. Pass-through: the payload is logged and
    /// otherwise ignored.
    pub fn receive_message(&self, request: &MessageRequest) {
        self.logs.lock().unwrap().push(MessageLog {
            hash: hash(&request.value),
            message_type: request.r#type,
            sender: request.sender.clone(),
            receiver: String::new(),
            time: SystemTime::now(),
        });
    }

    pub fn log_count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

impl Default for MessageManager {
    fn default() -> Self {
        MessageManager::new()
    }
}

fn hash(data: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
