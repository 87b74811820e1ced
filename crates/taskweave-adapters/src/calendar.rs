use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use taskweave_core::collaborators::CalendarSink;
use taskweave_core::{EventBlock, EventStatus, OracleError};

fn log_dry_run(blocks: &[EventBlock]) -> usize {
    info!(count = blocks.len(), "DRY-RUN: would apply blocks to calendar");
    for block in blocks {
        info!(
            "DRY-RUN: {} | {} → {} | source={}",
            block.title, block.start, block.end, block.source_agent
        );
    }
    blocks.len()
}

/// Logs what would be written and commits nothing.
#[derive(Debug, Default)]
pub struct DryRunCalendar;

#[async_trait]
impl CalendarSink for DryRunCalendar {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn apply(&self, blocks: &[EventBlock], _simulate: bool) -> Result<usize, OracleError> {
        Ok(log_dry_run(blocks))
    }
}

/// Calendar kept in process memory; applied blocks are marked `applied`.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    entries: Mutex<Vec<EventBlock>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<EventBlock> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl CalendarSink for InMemoryCalendar {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn apply(&self, blocks: &[EventBlock], simulate: bool) -> Result<usize, OracleError> {
        if simulate {
            return Ok(log_dry_run(blocks));
        }
        let applied = blocks.iter().map(|b| EventBlock {
            status: EventStatus::Applied,
            ..b.clone()
        });
        let mut entries = self.entries.lock();
        entries.extend(applied);
        info!(count = blocks.len(), total = entries.len(), "calendar blocks applied");
        Ok(blocks.len())
    }
}
