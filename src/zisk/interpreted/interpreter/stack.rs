use std::cell::Cell;

/// Native stack spent since the outermost `execute_program`, shared by an interpreter and the modules it
/// imports.
#[derive(Debug, Default)]
pub struct StackGuard {
    base: Cell<Option<usize>>,
}

#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::ptr::addr_of!(marker) as usize
}

impl StackGuard {
    /// Marks the current position as the base unless an enclosing evaluation already did. Returns
    /// whether it did, which is what `leave` expects back.
    pub fn enter(&self) -> bool {
        if self.base.get().is_some() {
            return false;
        }
        self.base.set(Some(stack_position()));
        true
    }

    pub fn leave(&self, entered: bool) {
        if entered {
            self.base.set(None);
        }
    }

    /// Bytes between the base and the caller; the stack may grow either way.
    pub fn used(&self) -> usize {
        self.base.get().map_or(0, |base| base.abs_diff(stack_position()))
    }
}

#[cfg(test)]
mod tests {
    use std::hint::black_box;

    use super::*;

    #[inline(never)]
    fn used_at_depth(guard: &StackGuard, depth: usize) -> usize {
        let frame = black_box([0u8; 64]);
        if depth == 0 {
            guard.used()
        } else {
            used_at_depth(guard, depth - 1) + frame[0] as usize
        }
    }

    #[test]
    fn measures_from_the_outermost_entry() {
        let guard = StackGuard::default();
        assert_eq!(guard.used(), 0);
        let outer = guard.enter();
        assert!(outer);
        let inner = guard.enter();
        assert!(!inner);
        assert!(used_at_depth(&guard, 64) > used_at_depth(&guard, 0));
        guard.leave(inner);
        assert!(guard.base.get().is_some());
        guard.leave(outer);
        assert_eq!(guard.used(), 0);
    }
}
