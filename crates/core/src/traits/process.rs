use crate::errors::FleetResult;

/// 操作系统进程句柄
///
/// 只负责转发启动、终止和存活查询，错误原样返回给调用方。
pub trait ProcessHandle: Send {
    /// 异步启动进程，启动发起后立即返回
    fn start(&mut self) -> FleetResult<()>;

    /// 请求终止进程，不保证立即退出
    fn stop(&mut self) -> FleetResult<()>;

    /// 查询调用时刻的进程存活状态
    fn is_running(&mut self) -> FleetResult<bool>;

    fn pid(&self) -> Option<u32> {
        None
    }
}
