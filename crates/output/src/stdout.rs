//! 표준 출력 싱크

use std::io::Write;

use auditpost_core::error::SinkError;
use auditpost_core::pipeline::Sink;

/// 표준 출력으로 이벤트를 기록하는 싱크
///
/// 한 번의 기록은 stdout 잠금 안에서 끝나므로 줄이 섞이지 않습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    /// 새 싱크를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl Sink for StdoutSink {
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        let mut out = std::io::stdout().lock();
        out.write_all(buf)?;
        out.flush()?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_full_length() {
        let sink = StdoutSink::new();
        assert_eq!(sink.write(b"{\"sequence\":1}\n").unwrap(), 15);
        assert!(sink.reopen().is_ok());
    }
}
