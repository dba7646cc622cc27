//! Round-robin task scheduler driven from the millisecond tick.
//!
//! A fixed set of tasks is registered up front, each with its own
//! preallocated stack; [`install`] then hooks the switch evaluator into
//! the tick dispatch and [`start`] launches the idle task. Between ticks
//! execution is strictly cooperative — the tick interrupt is the only
//! preemption point, and disabling the tick disables preemption.
//!
//! The actual register save/restore lives in the interrupt veneer (see
//! the startup code): on every interrupt it parks the interrupted task's
//! full context frame on that task's stack and publishes the frame
//! pointer in [`IRQ_TASK_SP`]; whatever frame pointer is there when the
//! veneer returns is the context that resumes. Switching tasks is
//! therefore nothing but swapping that one word, which is what
//! [`Scheduler::on_tick`] does every `TASK_SWITCH_RESOLUTION` ticks.

pub mod arena;

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config;
use crate::systick;
use crate::utils::Holder;

pub use self::arena::{Error, TaskId};

use self::arena::Arena;

/// Frame pointer of the interrupted task, maintained by the interrupt
/// veneer. Exported unmangled because the veneer is assembly.
#[no_mangle]
pub static IRQ_TASK_SP: AtomicU32 = AtomicU32::new(0);

pub struct Scheduler {
    arena: Arena,
    countdown: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { arena: Arena::new(), countdown: config::TASK_SWITCH_RESOLUTION }
    }

    /// Register the idle task (required before [`install`]).
    pub fn register_idle(&mut self, stack: &'static mut [u8], entry: fn()) -> Result<TaskId, Error> {
        self.arena.add_idle(stack, entry)
    }

    /// Register a runnable task.
    pub fn register(&mut self, stack: &'static mut [u8], entry: fn()) -> Result<TaskId, Error> {
        self.arena.add(stack, entry)
    }

    pub fn current(&self) -> TaskId {
        self.arena.current()
    }

    /// Stack pointer to resume the current task from (used to launch).
    pub fn current_sp(&self) -> u32 {
        self.arena.sp(self.arena.current())
    }

    /// Tick-time switch evaluation. Takes the outgoing context's frame
    /// pointer, returns the frame pointer to resume; most ticks that is
    /// the same value, every `TASK_SWITCH_RESOLUTION`-th it rotates the
    /// ring.
    pub fn on_tick(&mut self, sp: u32) -> u32 {
        self.countdown -= 1;
        if self.countdown > 0 {
            return sp;
        }
        self.countdown = config::TASK_SWITCH_RESOLUTION;
        self.arena.rotate(sp)
    }
}

static SCHED: Holder<Scheduler> = Holder::new();
static STARTED: AtomicBool = AtomicBool::new(false);

/// Park the scheduler and hook it into the tick. Call after registering
/// all tasks; preemption begins once [`start`] launches the idle task.
///
/// # Panics
///
/// Panics if no idle task was registered.
pub fn install(scheduler: Scheduler) {
    assert!(
        scheduler.arena.has_idle(),
        "scheduler installed without an idle task"
    );
    SCHED.init(scheduler);
    systick::install_scheduler(Some(tick_hook));
}

/// Remove the tick hook; the current task keeps the CPU from here on.
pub fn disable_preemption() {
    systick::install_scheduler(None);
}

fn tick_hook() {
    // Until start() has moved execution onto a task stack the frame
    // pointer below belongs to no task; swapping it would corrupt boot.
    if !STARTED.load(Ordering::Relaxed) {
        return;
    }
    let outgoing = IRQ_TASK_SP.load(Ordering::Relaxed);
    let incoming = SCHED.with(|s| s.on_tick(outgoing));
    IRQ_TASK_SP.store(incoming, Ordering::Relaxed);
}

/// Launch the idle task and hand the CPU to the scheduler. Never
/// returns; the registered tasks own the machine from here.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start() -> ! {
    let first = SCHED.with(|s| s.current_sp());
    IRQ_TASK_SP.store(first, Ordering::Relaxed);
    STARTED.store(true, Ordering::Relaxed);

    // Restore the idle task's seeded frame exactly as the interrupt
    // veneer would: saved CPSR first, then r0-r14, then jump through
    // the frame's PC slot while moving SPSR into CPSR.
    unsafe {
        core::arch::asm!(
            "ldr    lr, ={sp}",
            "ldr    lr, [lr]",
            "ldmia  lr!, {{r0}}",
            "msr    spsr_cxsf, r0",
            "ldmia  lr, {{r0-r14}}^",
            "nop",
            "ldr    lr, [lr, #60]",
            "movs   pc, lr",
            sp = sym IRQ_TASK_SP,
            options(noreturn),
        )
    }
}
