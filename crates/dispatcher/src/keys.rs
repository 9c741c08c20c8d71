/// 存储键命名空间，所有调度共享状态都放在同一个前缀下
#[derive(Debug, Clone)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 任务队列（有序集合）
    pub fn task_queue(&self) -> String {
        format!("{}:task:queue", self.prefix)
    }

    /// 提交时写入的任务元数据
    pub fn task_info(&self, task_id: &str) -> String {
        format!("{}:task:info:{}", self.prefix, task_id)
    }

    /// 根任务的停止标记
    pub fn task_control(&self, root_task_id: &str) -> String {
        format!("{}:task:ctrl:{}", self.prefix, root_task_id)
    }

    /// 已认领但尚未结束的任务集合
    pub fn processing(&self) -> String {
        format!("{}:task:processing", self.prefix)
    }

    pub fn execution(&self, task_id: &str) -> String {
        format!("{}:task:execution:{}", self.prefix, task_id)
    }

    pub fn worker(&self, name: &str) -> String {
        format!("{}:worker:{}", self.prefix, name)
    }

    /// 见过的全部Worker名称，不过期
    pub fn workers(&self) -> String {
        format!("{}:workers", self.prefix)
    }

    pub fn worker_control(&self, name: &str) -> String {
        format!("{}:worker:control:{}", self.prefix, name)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new("recon")
    }
}
