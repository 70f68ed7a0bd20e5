//! Message type codes shared with the engine.
//!
//! Every message on the wire starts with one of these one-byte codes.

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageCode {
    NewEvaluator = 0x20,
    NewEvaluatorResponse = 0x21,
    CloseEvaluator = 0x22,
    Evaluate = 0x23,
    EvaluateResponse = 0x24,
    EvaluateLog = 0x25,
    EvaluateRead = 0x26,
    EvaluateReadResponse = 0x27,
    EvaluateReadModule = 0x28,
    EvaluateReadModuleResponse = 0x29,
    ListResourcesRequest = 0x2A,
    ListResourcesResponse = 0x2B,
    ListModulesRequest = 0x2C,
    ListModulesResponse = 0x2D,
}

impl MessageCode {
    pub const ALL: [MessageCode; 14] = [
        MessageCode::NewEvaluator,
        MessageCode::NewEvaluatorResponse,
        MessageCode::CloseEvaluator,
        MessageCode::Evaluate,
        MessageCode::EvaluateResponse,
        MessageCode::EvaluateLog,
        MessageCode::EvaluateRead,
        MessageCode::EvaluateReadResponse,
        MessageCode::EvaluateReadModule,
        MessageCode::EvaluateReadModuleResponse,
        MessageCode::ListResourcesRequest,
        MessageCode::ListResourcesResponse,
        MessageCode::ListModulesRequest,
        MessageCode::ListModulesResponse,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageCode::NewEvaluator => "NewEvaluator",
            MessageCode::NewEvaluatorResponse => "NewEvaluatorResponse",
            MessageCode::CloseEvaluator => "CloseEvaluator",
            MessageCode::Evaluate => "Evaluate",
            MessageCode::EvaluateResponse => "EvaluateResponse",
            MessageCode::EvaluateLog => "EvaluateLog",
            MessageCode::EvaluateRead => "EvaluateRead",
            MessageCode::EvaluateReadResponse => "EvaluateReadResponse",
            MessageCode::EvaluateReadModule => "EvaluateReadModule",
            MessageCode::EvaluateReadModuleResponse => "EvaluateReadModuleResponse",
            MessageCode::ListResourcesRequest => "ListResourcesRequest",
            MessageCode::ListResourcesResponse => "ListResourcesResponse",
            MessageCode::ListModulesRequest => "ListModulesRequest",
            MessageCode::ListModulesResponse => "ListModulesResponse",
        }
    }

    /// The code the peer answers this message with, if any.
    ///
    /// `EvaluateRead`, `EvaluateReadModule` and the list requests are sent
    /// by the engine; their responses come from the client.
    pub fn response(self) -> Option<MessageCode> {
        match self {
            MessageCode::NewEvaluator => Some(MessageCode::NewEvaluatorResponse),
            MessageCode::Evaluate => Some(MessageCode::EvaluateResponse),
            MessageCode::EvaluateRead => Some(MessageCode::EvaluateReadResponse),
            MessageCode::EvaluateReadModule => Some(MessageCode::EvaluateReadModuleResponse),
            MessageCode::ListResourcesRequest => Some(MessageCode::ListResourcesResponse),
            MessageCode::ListModulesRequest => Some(MessageCode::ListModulesResponse),
            _ => None,
        }
    }

    pub fn is_response(self) -> bool {
        Self::ALL.iter().any(|c| c.response() == Some(self))
    }
}

impl TryFrom<u8> for MessageCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == value)
            .ok_or_else(|| Error::InvalidMessage(format!("unknown message code {:#04x}", value)))
    }
}

impl From<MessageCode> for u8 {
    fn from(code: MessageCode) -> u8 {
        code.code()
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.code())
    }
}
