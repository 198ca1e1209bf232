//! Single terminal failure path.
//!
//! Every stage error ends up here. The controller trips at most once: the
//! state moves `Armed -> Tripped` on entry, before any reporting happens, so
//! a failure raised while the report is being delivered cannot escalate a
//! second time. Transport failures during reporting are logged and never
//! re-enter the controller.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{BuildError, ErrorClass};
use crate::log_collector::LogCollector;
use crate::models::RunReport;
use crate::report::{escape_markdown, Reporter};

/// Process exit status for any escalated failure.
pub const FAILURE_EXIT_CODE: i32 = 1;

const ARMED: u8 = 0;
const TRIPPED: u8 = 1;
const TERMINATED: u8 = 2;

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    Armed,
    Tripped,
    Terminated,
}

/// Converts the first fatal error of a run into one failure report.
pub struct EscalationController {
    state: AtomicU8,
    reporter: Reporter,
    log: Option<Arc<LogCollector>>,
    /// Variant label included in reports once flags are known
    context: Option<String>,
}

impl EscalationController {
    pub fn new(reporter: Reporter, log: Option<Arc<LogCollector>>) -> Self {
        EscalationController {
            state: AtomicU8::new(ARMED),
            reporter,
            log,
            context: None,
        }
    }

    /// Attach the run context (kernel and variant label) shown in failure reports.
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn state(&self) -> EscalationState {
        match self.state.load(Ordering::SeqCst) {
            ARMED => EscalationState::Armed,
            TRIPPED => EscalationState::Tripped,
            _ => EscalationState::Terminated,
        }
    }

    /// Build the failure record for an error.
    pub fn failure_report(&self, error: &BuildError) -> RunReport {
        let class = match error.class() {
            ErrorClass::Validation => "validation error",
            ErrorClass::Stage => "stage error",
        };
        let mut message = format!("{} during {}: {}", class, error.stage(), error);
        if let Some(context) = &self.context {
            message = format!("{}\n{}", context, message);
        }
        RunReport::failure(message, self.log.as_ref().map(|l| l.log_path().to_path_buf()))
    }

    /// Report the failure and return the exit status. Only the first call reports.
    pub fn escalate(&self, error: &BuildError) -> i32 {
        if self
            .state
            .compare_exchange(ARMED, TRIPPED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::error!("[Escalation] Already tripped, not re-escalating: {}", error);
            return FAILURE_EXIT_CODE;
        }

        log::error!("[Escalation] Fatal {} failure: {}", error.stage(), error);
        let report = self.failure_report(error);

        if let Err(e) = self.reporter.send_text(&Reporter::failure_text(&report)) {
            log::error!("[Escalation] Failure report not delivered: {}", e);
        }

        if let Some(log) = &self.log {
            if let Err(e) = log.flush_to_disk() {
                log::warn!("[Escalation] Log flush incomplete: {}", e);
            }
            let caption = format!("Build log \\({}\\)", escape_markdown(error.stage()));
            if let Err(e) = self.reporter.send_document(log.log_path(), &caption) {
                log::error!("[Escalation] Log upload failed: {}", e);
            }
        }

        self.state.store(TERMINATED, Ordering::SeqCst);
        FAILURE_EXIT_CODE
    }

    /// Escalate and terminate the process.
    pub fn trip(&self, error: &BuildError) -> ! {
        let code = self.escalate(error);
        if let Some(log) = &self.log {
            let _ = log.flush_to_disk();
        }
        std::process::exit(code)
    }
}
