//! Protocol models

mod command;
mod inbound;
mod outbound;

pub use command::CommandType;
pub use inbound::{
    ErrorData, InboundMessage, Operation, PublishMessage, ResponseMessage, ResponseStatus,
    ScanLocationData, Topic,
};
pub use outbound::OutboundCommand;
