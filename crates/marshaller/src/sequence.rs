//! 시퀀스 추적 — 누락/역순 도착 감지
//!
//! 커널은 시퀀스 번호를 단조 증가시키지만 전달 순서는 보장하지 않습니다.
//! [`SequenceTracker`]는 건너뛴 번호를 기억해 두었다가 늦게 도착하면 해소하고,
//! 허용 윈도우를 벗어나면 유실로 간주해 추적을 멈춥니다. 모든 판단은 진단용입니다.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use metrics::counter;

use auditpost_core::metrics::{
    MARSHALLER_SEQUENCES_LOST_TOTAL, MARSHALLER_SEQUENCES_OUT_OF_ORDER_TOTAL,
};

/// 한 번의 [`SequenceTracker::detect`] 호출 결과
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    /// 늦게 도착해 해소된 시퀀스와 지연(lag)
    pub resolved: Vec<(u32, u32)>,
    /// 윈도우를 벗어나 유실로 간주된 시퀀스
    pub lost: Vec<u32>,
    /// 윈도우보다 넓은 간격이라 추적 없이 바로 유실 처리된 구간
    ///
    /// 간격 크기에 비례해 메모리를 쓰지 않도록 개별 번호 대신 범위로 보고합니다.
    pub skipped: Option<RangeInclusive<u32>>,
}

impl SequenceReport {
    /// 이번 호출에서 유실로 간주된 시퀀스 수 (`lost` + `skipped`)
    pub fn lost_count(&self) -> u64 {
        let skipped = self
            .skipped
            .as_ref()
            .map_or(0, |range| u64::from(range.end() - range.start()) + 1);
        self.lost.len() as u64 + skipped
    }
}

/// 시퀀스 누락 추적기
#[derive(Debug)]
pub struct SequenceTracker {
    /// 지금까지 본 가장 큰 시퀀스 (0이면 미초기화)
    last_seq: u32,
    /// 아직 도착하지 않은 시퀀스
    missed: BTreeSet<u32>,
    /// 관측된 최대 지연
    worst_lag: u32,
    /// 허용 역순 거리
    max_out_of_order: u32,
    /// 역순 해소를 로그로 남길지 여부
    log_out_of_order: bool,
}

impl SequenceTracker {
    /// 새 추적기를 생성합니다.
    pub fn new(max_out_of_order: u32, log_out_of_order: bool) -> Self {
        Self {
            last_seq: 0,
            missed: BTreeSet::new(),
            worst_lag: 0,
            max_out_of_order,
            log_out_of_order,
        }
    }

    /// 새 시퀀스 번호를 관측합니다.
    pub fn detect(&mut self, seq: u32) -> SequenceReport {
        let mut report = SequenceReport::default();

        if self.last_seq != 0 && seq > self.last_seq.saturating_add(1) {
            // 중간 번호를 건너뛰었음. 다음 번호들에서 다시 확인
            let first_missing = self.last_seq + 1;
            let from = first_missing.max(seq.saturating_sub(self.max_out_of_order));
            if from > first_missing {
                report.skipped = Some(first_missing..=from - 1);
                tracing::error!(
                    from = first_missing,
                    to = from - 1,
                    current = seq,
                    "sequence gap wider than out of order window"
                );
            }
            self.missed.extend(from..seq);
        }

        let last_seq = self.last_seq;
        let max_out_of_order = self.max_out_of_order;
        self.missed.retain(|&missed| {
            if missed == seq {
                report.resolved.push((missed, last_seq.saturating_sub(missed)));
                false
            } else if seq.saturating_sub(missed) > max_out_of_order {
                report.lost.push(missed);
                false
            } else {
                true
            }
        });

        for &(missed, lag) in &report.resolved {
            self.worst_lag = self.worst_lag.max(lag);
            counter!(MARSHALLER_SEQUENCES_OUT_OF_ORDER_TOTAL).increment(1);
            if self.log_out_of_order {
                tracing::warn!(
                    sequence = missed,
                    lag,
                    worst_lag = self.worst_lag,
                    "received out of order sequence"
                );
            }
        }

        counter!(MARSHALLER_SEQUENCES_LOST_TOTAL).increment(report.lost_count());
        for &missed in &report.lost {
            tracing::error!(
                sequence = missed,
                current = seq,
                worst_lag = self.worst_lag,
                "likely missed sequence"
            );
        }

        self.last_seq = self.last_seq.max(seq);
        report
    }

    /// 지금까지 본 가장 큰 시퀀스
    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    /// 관측된 최대 지연
    pub fn worst_lag(&self) -> u32 {
        self.worst_lag
    }

    /// 해당 시퀀스를 아직 기다리는 중인지 확인합니다.
    pub fn is_missing(&self, seq: u32) -> bool {
        self.missed.contains(&seq)
    }

    /// 기다리는 시퀀스 수
    pub fn missing_count(&self) -> usize {
        self.missed.len()
    }
}
