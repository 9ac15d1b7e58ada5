/// 会话上下文
///
/// 由宿主状态层在每次派发时提供，只用于填充意图的关联元数据。
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// 当前登录用户ID (可选)
    pub user_id: Option<String>,
}

impl SessionContext {
    /// 创建匿名会话上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置用户ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
