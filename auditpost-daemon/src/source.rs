//! 입력 소스 — 표준 입력의 감사 로그 줄을 원시 레코드로 변환합니다.
//!
//! 입력 형식은 auditd 로그 줄과 같습니다.
//!
//! ```text
//! type=SYSCALL msg=audit(1364481363.243:24287): arch=c000003e syscall=2 ...
//! type=1320 msg=audit(1364481363.243:24287):
//! node=web01 type=UNKNOWN[1334] msg=audit(1364481363.250:24288): prog-id=42 op=LOAD
//! ```
//!
//! `msg=` 뒤의 내용이 그대로 레코드 페이로드가 됩니다.
//! 해석할 수 없는 줄은 카운트만 올리고 건너뜁니다.

use metrics::counter;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use auditpost_core::error::ParseError;
use auditpost_core::metrics::{DAEMON_RECORDS_RECEIVED_TOTAL, DAEMON_RECORD_DECODE_ERRORS_TOTAL};
use auditpost_core::types::RawRecord;
use auditpost_marshaller::parser::MAX_RECORD_SIZE;

use crate::dispatch::Command;

/// 헤더(`node=... type=...`)를 포함한 한 줄의 최대 길이
pub const MAX_LINE_SIZE: usize = MAX_RECORD_SIZE + 256;

/// 입력 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// 전달한 레코드 수
    pub received: u64,
    /// 디코딩 실패로 건너뛴 줄 수
    pub decode_errors: u64,
}

/// 로그 줄 하나를 원시 레코드로 디코딩합니다.
pub fn decode_line(line: &str) -> Result<RawRecord, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() > MAX_LINE_SIZE {
        return Err(ParseError::TooLarge {
            size: line.len(),
            max: MAX_LINE_SIZE,
        });
    }

    let (header, payload) = line
        .split_once("msg=")
        .ok_or_else(|| ParseError::Malformed("missing msg= field".to_owned()))?;

    let type_field = header
        .split_whitespace()
        .find_map(|token| token.strip_prefix("type="))
        .ok_or_else(|| ParseError::Malformed("missing type= field".to_owned()))?;

    let record_type = parse_record_type(type_field)?;
    Ok(RawRecord::new(record_type, payload.as_bytes().to_vec()))
}

/// `SYSCALL`, `1300`, `UNKNOWN[1334]` 형식의 타입 필드를 해석합니다.
pub fn parse_record_type(field: &str) -> Result<u16, ParseError> {
    if let Ok(code) = field.parse::<u16>() {
        return Ok(code);
    }
    if let Some(inner) = field
        .strip_prefix("UNKNOWN[")
        .and_then(|rest| rest.strip_suffix(']'))
    {
        return inner
            .parse::<u16>()
            .map_err(|_| ParseError::UnknownType(field.to_owned()));
    }
    record_type_code(field).ok_or_else(|| ParseError::UnknownType(field.to_owned()))
}

/// 레코드 타입 이름을 커널 타입 코드로 변환합니다.
pub fn record_type_code(name: &str) -> Option<u16> {
    let code = match name {
        "LOGIN" => 1006,
        "USER_AUTH" => 1100,
        "USER_ACCT" => 1101,
        "USER_MGMT" => 1102,
        "CRED_ACQ" => 1103,
        "CRED_DISP" => 1104,
        "USER_START" => 1105,
        "USER_END" => 1106,
        "USER_AVC" => 1107,
        "USER_CHAUTHTOK" => 1108,
        "USER_ERR" => 1109,
        "CRED_REFR" => 1110,
        "USYS_CONFIG" => 1111,
        "USER_LOGIN" => 1112,
        "USER_LOGOUT" => 1113,
        "ADD_USER" => 1114,
        "DEL_USER" => 1115,
        "USER_CMD" => 1123,
        "SERVICE_START" => 1130,
        "SERVICE_STOP" => 1131,
        "DAEMON_START" => 1200,
        "DAEMON_END" => 1201,
        "DAEMON_ABORT" => 1202,
        "DAEMON_CONFIG" => 1203,
        "SYSCALL" => 1300,
        "PATH" => 1302,
        "IPC" => 1303,
        "SOCKETCALL" => 1304,
        "CONFIG_CHANGE" => 1305,
        "SOCKADDR" => 1306,
        "CWD" => 1307,
        "EXECVE" => 1309,
        "IPC_SET_PERM" => 1311,
        "MQ_OPEN" => 1312,
        "MQ_SENDRECV" => 1313,
        "MQ_NOTIFY" => 1314,
        "MQ_GETSETATTR" => 1315,
        "KERNEL_OTHER" => 1316,
        "FD_PAIR" => 1317,
        "OBJ_PID" => 1318,
        "TTY" => 1319,
        "EOE" => 1320,
        "BPRM_FCAPS" => 1321,
        "CAPSET" => 1322,
        "MMAP" => 1323,
        "NETFILTER_PKT" => 1324,
        "NETFILTER_CFG" => 1325,
        "SECCOMP" => 1326,
        "PROCTITLE" => 1327,
        "FEATURE_CHANGE" => 1328,
        "REPLACE" => 1329,
        "KERN_MODULE" => 1330,
        "FANOTIFY" => 1331,
        "TIME_INJOFFSET" => 1332,
        "TIME_ADJNTPVAL" => 1333,
        "BPF" => 1334,
        "EVENT_LISTENER" => 1335,
        "URINGOP" => 1336,
        "OPENAT2" => 1337,
        "AVC" => 1400,
        "SELINUX_ERR" => 1401,
        "ANOM_PROMISCUOUS" => 1700,
        "ANOM_ABEND" => 1701,
        "ANOM_LINK" => 1702,
        _ => return None,
    };
    Some(code)
}

/// 입력의 모든 줄을 디스패치 채널로 전달합니다.
///
/// 입력이 끝나거나(EOF), 취소되거나, 디스패치 스레드가 종료되면 반환합니다.
/// 채널이 가득 차면 기다리므로 입력 속도가 재조립 속도를 넘지 않습니다.
pub async fn forward_records<R>(
    reader: R,
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
) -> SourceStats
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = SourceStats::default();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("record source cancelled");
                break;
            }
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!(received = stats.received, "input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input");
                    break;
                }
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        let record = match decode_line(&line) {
            Ok(record) => record,
            Err(e) => {
                stats.decode_errors += 1;
                counter!(DAEMON_RECORD_DECODE_ERRORS_TOTAL).increment(1);
                tracing::warn!(error = %e, "skipping undecodable input line");
                continue;
            }
        };

        if tx.send(Command::Record(record)).await.is_err() {
            tracing::warn!("dispatcher stopped, record source exiting");
            break;
        }
        stats.received += 1;
        counter!(DAEMON_RECORDS_RECEIVED_TOTAL).increment(1);
    }

    stats
}
