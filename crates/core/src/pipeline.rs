//! 파이프라인 trait — 출력 싱크 확장 포인트 정의

use crate::error::SinkError;

/// 완성된 이벤트 문서를 받아 외부로 내보내는 싱크
///
/// 파일, 표준 출력, HTTP 등 전송 방식과 무관하게 `ReliableWriter`가 이 trait만 사용합니다.
/// 여러 스레드(디스패치 스레드, 시그널 처리 태스크)에서 동시에 참조하므로
/// 모든 메서드는 `&self`를 받고 내부 가변성으로 상태를 보호합니다.
pub trait Sink: Send + Sync {
    /// 인코딩된 바이트를 기록하고 기록한 바이트 수를 반환합니다.
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError>;

    /// 하위 리소스를 다시 엽니다 (로그 로테이션).
    fn reopen(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// 새 기록을 거부하고 종료를 시작합니다.
    fn shutdown(&self) {}
}

impl<S: Sink + ?Sized> Sink for std::sync::Arc<S> {
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        (**self).write(buf)
    }

    fn reopen(&self) -> Result<(), SinkError> {
        (**self).reopen()
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}
