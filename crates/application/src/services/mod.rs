mod message_service;


pub use message_service::{
    ListMessagesRequest, MessageService, MessageServiceDependencies, RegenerateAiMessageRequest,
    SendAiMessageRequest, SendAiMessageResult, SendMessageRequest,
};
