//! Interrupt handling for running scans.
//!
//! A Ctrl-C during a scan does not kill recool. Instead the controller asks
//! the user what to do with the scan in flight: keep going, skip it, skip it
//! and stop scanning for the rest of the session, or exit.
//!
//! The interrupt source is an explicit [`InterruptSignal`] handed to the
//! controller. It is only armed while a scan is running; a Ctrl-C outside a
//! scan terminates the process as usual.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use console::{style, Term};
use indicatif::ProgressBar;
use tokio::sync::mpsc;

/// Exit code used when Ctrl-C arrives while no scan is running.
const SIGINT_EXIT_CODE: i32 = 130;

/// What the user picked at the interrupt prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptChoice {
    Continue,
    Skip,
    SkipForever,
    Exit,
}

impl InterruptChoice {
    pub const ALL: [InterruptChoice; 4] = [
        Self::Continue,
        Self::Skip,
        Self::SkipForever,
        Self::Exit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Continue => "Continue scanning",
            Self::Skip => "Skip this scan",
            Self::SkipForever => "Skip this scan and never scan again",
            Self::Exit => "Exit recool",
        }
    }
}

/// What the scan supervisor should do after an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the scanner process running.
    Resume,
    /// Kill the scanner process and report no results.
    Abort,
    /// Kill the scanner process and leave the program without saving.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    ScanRunning,
    PromptingUser,
    Aborted,
}

/// Source of the user's answer at the interrupt prompt.
pub trait Prompt {
    fn choose(&mut self) -> io::Result<InterruptChoice>;
}

/// Interactive prompt on the controlling terminal.
///
/// The spinner is hidden while the menu is shown.
pub struct TerminalPrompt {
    spinner: ProgressBar,
    term: Term,
}

impl TerminalPrompt {
    pub fn new(spinner: ProgressBar) -> Self {
        Self {
            spinner,
            term: Term::stderr(),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn choose(&mut self) -> io::Result<InterruptChoice> {
        let term = &self.term;
        self.spinner.suspend(|| {
            term.write_line(&style("What do you want to do?").bold().to_string())?;
            for (i, choice) in InterruptChoice::ALL.iter().enumerate() {
                term.write_line(&format!("  {}) {}", style(i + 1).cyan(), choice.label()))?;
            }
            loop {
                term.write_str("> ")?;
                let answer = term.read_line()?;
                match answer.trim().parse::<usize>() {
                    Ok(n) if (1..=InterruptChoice::ALL.len()).contains(&n) => {
                        return Ok(InterruptChoice::ALL[n - 1]);
                    }
                    _ => term.write_line("Please enter a number from 1 to 4.")?,
                }
            }
        })
    }
}

/// Prompt that always gives the same answer. Used when nobody is at the
/// terminal to ask.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub InterruptChoice);

impl Prompt for FixedChoice {
    fn choose(&mut self) -> io::Result<InterruptChoice> {
        Ok(self.0)
    }
}

/// Sending half of an [`InterruptSignal`].
#[derive(Debug, Clone)]
pub struct InterruptTrigger {
    tx: mpsc::UnboundedSender<()>,
    armed: Arc<AtomicBool>,
}

impl InterruptTrigger {
    /// Deliver an interrupt. Returns `false` if no scan is listening.
    pub fn trigger(&self) -> bool {
        self.armed.load(Ordering::SeqCst) && self.tx.send(()).is_ok()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// Receiving half: the cancellation channel a scan observes.
#[derive(Debug)]
pub struct InterruptSignal {
    rx: mpsc::UnboundedReceiver<()>,
    armed: Arc<AtomicBool>,
}

impl InterruptSignal {
    /// A manually driven signal.
    pub fn channel() -> (InterruptTrigger, InterruptSignal) {
        let (tx, rx) = mpsc::unbounded_channel();
        let armed = Arc::new(AtomicBool::new(false));
        (
            InterruptTrigger {
                tx,
                armed: armed.clone(),
            },
            InterruptSignal { rx, armed },
        )
    }

    /// A signal fed by Ctrl-C. Must be called inside a tokio runtime.
    ///
    /// While no scan is armed, Ctrl-C exits the process.
    pub fn ctrl_c() -> Self {
        let (trigger, signal) = Self::channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !trigger.trigger() {
                    tracing::info!("Interrupted outside of a scan, exiting");
                    std::process::exit(SIGINT_EXIT_CODE);
                }
            }
        });
        signal
    }

    fn arm(&mut self) {
        self.drain();
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
        self.drain();
    }

    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Tracks the scan lifecycle and turns interrupts into decisions.
pub struct InterruptController {
    signal: InterruptSignal,
    prompt: Box<dyn Prompt>,
    state: ScanState,
    suppressed: bool,
}

impl InterruptController {
    pub fn new(signal: InterruptSignal, prompt: impl Prompt + 'static) -> Self {
        Self {
            signal,
            prompt: Box::new(prompt),
            state: ScanState::Idle,
            suppressed: false,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Set once the user picked "never scan again"; no further scans may
    /// start this session.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Arm the interrupt signal for the duration of one scan.
    pub fn begin_scan(&mut self) {
        self.signal.arm();
        self.state = ScanState::ScanRunning;
    }

    /// Disarm the signal. Must be called on every exit path of a scan.
    pub fn end_scan(&mut self) {
        self.signal.disarm();
        self.state = ScanState::Idle;
    }

    /// Wait for the next interrupt. `None` once the signal source is gone.
    pub async fn interrupted(&mut self) -> Option<()> {
        self.signal.rx.recv().await
    }

    /// Ask the user what to do with the running scan.
    ///
    /// A prompt that cannot be read counts as "skip this scan".
    pub fn decide(&mut self) -> Decision {
        self.state = ScanState::PromptingUser;

        let choice = self.prompt.choose().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Interrupt prompt failed, skipping scan");
            InterruptChoice::Skip
        });
        // Interrupts sent while the prompt was open are answered by it.
        self.signal.drain();

        tracing::info!(choice = choice.label(), "Interrupt handled");

        match choice {
            InterruptChoice::Continue => {
                self.state = ScanState::ScanRunning;
                Decision::Resume
            }
            InterruptChoice::Skip => {
                self.state = ScanState::Aborted;
                Decision::Abort
            }
            InterruptChoice::SkipForever => {
                self.suppressed = true;
                self.state = ScanState::Aborted;
                Decision::Abort
            }
            InterruptChoice::Exit => {
                self.state = ScanState::Aborted;
                Decision::Exit
            }
        }
    }
}
