/// 从任务ID推导所属根任务ID
///
/// 子任务ID约定为 `"{MainTaskId}-{index}"`：最后一个 `-` 之后全部是数字时，
/// 前缀即为根任务ID，否则任务ID本身就是根。
///
/// 注意：本身以 `-数字` 结尾的根任务ID（例如 `scan-2024`）同样会被截断，
/// 这是沿用的历史编码方式。
pub fn root_task_id(task_id: &str) -> &str {
    match task_id.rfind('-') {
        Some(idx) if idx > 0 => {
            let suffix = &task_id[idx + 1..];
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                &task_id[..idx]
            } else {
                task_id
            }
        }
        _ => task_id,
    }
}
