use aerobook_core::{NotificationSink, StoreResult};
use aerobook_shared::BookingEvent;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use crate::app_config::KafkaConfig;

/// Publishes booking lifecycle events to Kafka, keyed by booking reference so
/// every event for one booking lands on the same partition.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish_raw(&self, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    self.topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", self.topic, e);
                Err(e)
            }
        }
    }
}

/// JSON body sent for an event.
pub fn encode_event(event: &BookingEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

#[async_trait]
impl NotificationSink for EventProducer {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()> {
        let payload = encode_event(event)?;
        self.publish_raw(event.reference(), &payload).await?;
        Ok(())
    }
}
