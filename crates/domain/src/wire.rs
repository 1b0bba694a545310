use crate::errors::ScenarioError;
use hickory_proto::op::{Header, Message, MessageType, ResponseCode};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};

/// Serialize a Message to wire format bytes
pub fn encode(message: &Message) -> Result<Vec<u8>, ScenarioError> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);

    message
        .emit(&mut encoder)
        .map_err(|e| ScenarioError::Codec(format!("Failed to serialize DNS message: {}", e)))?;

    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<Message, ScenarioError> {
    Message::from_vec(bytes)
        .map_err(|e| ScenarioError::Codec(format!("Failed to parse DNS message: {}", e)))
}

/// `Message` only exposes the id and QR bit through its header.
pub fn set_id(message: &mut Message, id: u16) {
    let mut header: Header = *message.header();
    header.set_id(id);
    message.set_header(header);
}

pub fn set_message_type(message: &mut Message, message_type: MessageType) {
    let mut header: Header = *message.header();
    header.set_message_type(message_type);
    message.set_header(header);
}

/// SERVFAIL keyed to the query's ID and question, sent when nothing scripted matches.
pub fn servfail_for(query: &Message) -> Message {
    let mut response = Message::new(query.id(), MessageType::Response, query.op_code());
    response.set_recursion_desired(query.recursion_desired());
    response.add_queries(query.queries().to_vec());
    response.set_response_code(ResponseCode::ServFail);
    response
}
