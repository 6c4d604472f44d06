//! Indexing Progress Module
//!
//! インデックス作成ジョブの進捗を、不変のスナップショットとして公開するモジュール。
//! 書き込みはジョブを実行する1つのスレッドだけが行い、読み取り側は
//! `snapshot()`で現在のスナップショットへの参照を取得します。

use std::sync::{Arc, RwLock};

use serde::Serialize;

/// ジョブの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// ジョブ未実行
    Idle,
    /// インデックス作成中
    Indexing,
    /// 正常終了
    Completed,
    /// 失敗（ストアは空の状態）
    Failed,
}

/// 進捗のスナップショット（不変）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// ジョブの段階
    pub phase: JobPhase,
    /// 処理中のファイル名
    pub current_file: Option<String>,
    /// 処理を終えたファイル数
    pub files_done: usize,
    /// 対象ファイル数
    pub files_total: usize,
    /// ストアに書き込んだ行数
    pub rows_indexed: usize,
    /// 人が読むための状態メッセージ
    pub message: String,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            phase: JobPhase::Idle,
            current_file: None,
            files_done: 0,
            files_total: 0,
            rows_indexed: 0,
            message: "Idle".to_string(),
        }
    }
}

impl ProgressSnapshot {
    /// ジョブ実行中かどうか
    pub fn is_indexing(&self) -> bool {
        self.phase == JobPhase::Indexing
    }

    /// ファイル単位の進捗率（0〜100）
    pub fn percent(&self) -> u8 {
        if self.files_total == 0 {
            return match self.phase {
                JobPhase::Completed => 100,
                _ => 0,
            };
        }
        ((self.files_done.min(self.files_total) * 100) / self.files_total) as u8
    }
}

/// 進捗スナップショットの保持者
///
/// 更新はスナップショットを複製・変更してから差し替えるため、
/// 読み取り側が途中状態を観測することはありません。
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    current: RwLock<Arc<ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn snapshot(&self) -> Arc<ProgressSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    fn update(&self, change: impl FnOnce(&mut ProgressSnapshot)) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = (**guard).clone();
        change(&mut next);
        *guard = Arc::new(next);
    }

    pub fn reset(&self) {
        self.update(|s| *s = ProgressSnapshot::default());
    }

    pub fn start(&self, files_total: usize) {
        self.update(|s| {
            *s = ProgressSnapshot {
                phase: JobPhase::Indexing,
                files_total,
                message: "Starting".to_string(),
                ..Default::default()
            }
        });
    }

    pub fn begin_file(&self, file: &str) {
        self.update(|s| {
            s.current_file = Some(file.to_string());
            s.message = format!("Parsing {}...", file);
        });
    }

    pub fn end_file(&self) {
        self.update(|s| s.files_done += 1);
    }

    pub fn add_rows(&self, rows: usize) {
        self.update(|s| s.rows_indexed += rows);
    }

    pub fn complete(&self, seconds: f64) {
        self.update(|s| {
            s.phase = JobPhase::Completed;
            s.current_file = None;
            s.message = format!("Complete! {} rows in {:.1}s", s.rows_indexed, seconds);
        });
    }

    pub fn fail(&self, reason: &str) {
        self.update(|s| {
            s.phase = JobPhase::Failed;
            s.rows_indexed = 0;
            s.message = format!("Error: {}", reason);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let tracker = ProgressTracker::default();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, JobPhase::Idle);
        assert_eq!(snapshot.message, "Idle");
        assert!(!snapshot.is_indexing());
        assert_eq!(snapshot.percent(), 0);
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let tracker = ProgressTracker::default();
        tracker.start(2);
        let before = tracker.snapshot();

        tracker.begin_file("a.xlsx");
        tracker.add_rows(500);
        tracker.end_file();

        assert_eq!(before.rows_indexed, 0);
        assert_eq!(before.current_file, None);

        let after = tracker.snapshot();
        assert!(after.is_indexing());
        assert_eq!(after.rows_indexed, 500);
        assert_eq!(after.current_file.as_deref(), Some("a.xlsx"));
        assert_eq!(after.message, "Parsing a.xlsx...");
        assert_eq!(after.percent(), 50);
    }

    #[test]
    fn test_complete_and_fail_messages() {
        let tracker = ProgressTracker::default();
        tracker.start(1);
        tracker.add_rows(12);
        tracker.complete(1.25);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, JobPhase::Completed);
        assert!(snapshot.message.starts_with("Complete! 12 rows in"));

        tracker.start(1);
        tracker.add_rows(3);
        tracker.fail("Embedding backend error: timeout");
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, JobPhase::Failed);
        assert_eq!(snapshot.rows_indexed, 0);
        assert_eq!(snapshot.message, "Error: Embedding backend error: timeout");

        tracker.reset();
        assert_eq!(*tracker.snapshot(), ProgressSnapshot::default());
    }
}
