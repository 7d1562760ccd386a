//! Event <-> wire frame codec
//!
//! The topic part is the event type; the payload part is the bincode
//! encoding of the whole envelope. Decoding checks that the two agree.

use crate::error::CodecError;
use crate::event::Event;

use super::transport::WireMessage;

pub fn encode(event: &Event) -> Result<WireMessage, CodecError> {
    let payload =
        bincode::serialize(event).map_err(|e| CodecError::Serialization(e.to_string()))?;
    Ok(WireMessage {
        topic: event.event_type().to_string(),
        payload,
    })
}

pub fn decode(message: &WireMessage) -> Result<Event, CodecError> {
    let mut event: Event = bincode::deserialize(&message.payload)
        .map_err(|e| CodecError::Deserialization(e.to_string()))?;
    if event.event_type() != message.topic || !event.is_consistent() {
        return Err(CodecError::TopicMismatch {
            frame: message.topic.clone(),
            event: event.event_type().to_string(),
        });
    }
    event.mark_remote();
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;
    use crate::messages::OrderUpdate;
    use chrono::Utc;
    use hermes_core::{Direction, Exchange, Offset, OrderStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_payload_survives_the_wire() {
        let event = Event::new(EventPayload::VendorOrder(OrderUpdate {
            gateway: "ctp".to_string(),
            routing_key: "1_42_7".to_string(),
            sys_id: Some("  1234".to_string()),
            symbol: "rb2510".to_string(),
            exchange: Exchange::Shfe,
            direction: Direction::Long,
            offset: Offset::Open,
            price: dec!(3512.5),
            volume: 3,
            traded: 1,
            status: OrderStatus::PartTraded,
            message: String::new(),
            timestamp: Utc::now(),
        }))
        .with_source("ctp");

        let frame = encode(&event).unwrap();
        assert_eq!(frame.topic, "gateway.order");

        let decoded = decode(&frame).unwrap();
        assert!(decoded.is_remote());
        assert_eq!(decoded.payload(), event.payload());
        assert_eq!(decoded.trace_id(), event.trace_id());
    }

    #[test]
    fn test_topic_mismatch_rejected() {
        let mut frame = encode(&Event::custom("X", "body")).unwrap();
        frame.topic = "Y".to_string();
        assert!(matches!(
            decode(&frame),
            Err(CodecError::TopicMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        let frame = WireMessage {
            topic: "X".to_string(),
            payload: vec![0xff, 0x00, 0x13],
        };
        assert!(matches!(
            decode(&frame),
            Err(CodecError::Deserialization(_))
        ));
    }
}
