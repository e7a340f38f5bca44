use std::sync::Arc;

use application::MessageService;
use tokio_util::sync::CancellationToken;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<MessageService>,
    pub jwt_service: Arc<JwtService>,
    /// 服务关闭时取消，进行中的补全请求使用它的子 token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        message_service: Arc<MessageService>,
        jwt_service: Arc<JwtService>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            message_service,
            jwt_service,
            shutdown,
        }
    }
}
