use std::cell::Cell;

// Only tracks nesting on the calling thread. Tests each run on their own thread and there is no
// real hardware to protect.
struct TrackingCriticalSection;
critical_section::set_impl!(TrackingCriticalSection);

thread_local! {
    static DEPTH: Cell<usize> = Cell::new(0);
    static ENTERED: Cell<usize> = Cell::new(0);
}

unsafe impl critical_section::Impl for TrackingCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        ENTERED.with(|entered| entered.set(entered.get() + 1));
    }

    unsafe fn release(_restore_state: critical_section::RawRestoreState) {
        DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// How many critical sections are currently held on this thread.
pub fn depth() -> usize {
    DEPTH.with(|depth| depth.get())
}

/// How many critical sections have been entered on this thread.
pub fn times_entered() -> usize {
    ENTERED.with(|entered| entered.get())
}
