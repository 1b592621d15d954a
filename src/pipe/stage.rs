//! Two-deep pipeline register with valid/ready handshaking.
//!
//! `PipeStage2` models the two-register skid buffer every multiplier and
//! adder in the datapath is built from: it can absorb one cycle of
//! downstream stall without dropping upstream data. The register-enable and
//! valid-advance equations follow the RTL:
//!
//! ```text
//! accept_into_1 = in_valid && !(valid1 && valid2 && !out_ready)
//! advance_to_2  = valid1   && !(valid2 && !out_ready)
//! next_valid1   = (!out_ready && valid1 && valid2) ? valid1 : in_valid
//! next_valid2   = (!out_ready && valid2)           ? valid2 : valid1
//! ```

/// A two-stage pipeline register. `f_stage1` and `f_stage2` are the pure
/// per-stage functions of the instantiation; they run only when the
/// corresponding register is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeStage2<T> {
    data1: T,
    data2: T,
    valid1: bool,
    valid2: bool,
}

impl<T: Copy + Default> PipeStage2<T> {
    /// Can this stage accept input this cycle?
    #[inline]
    pub fn in_ready(&self, out_ready: bool) -> bool {
        !(self.valid1 && self.valid2 && !out_ready)
    }

    /// Is the stage-2 output valid?
    #[inline]
    pub fn out_valid(&self) -> bool {
        self.valid2
    }

    /// The latched stage-2 output. Meaningful only while `out_valid()`.
    #[inline]
    pub fn out_data(&self) -> &T {
        &self.data2
    }

    /// Advance one clock edge. Returns true when the input was accepted
    /// into register 1.
    pub fn tick(
        &mut self,
        in_valid: bool,
        in_data: T,
        out_ready: bool,
        f_stage1: impl FnOnce(&T) -> T,
        f_stage2: impl FnOnce(&T) -> T,
    ) -> bool {
        let en1 = in_valid && !(self.valid1 && self.valid2 && !out_ready);
        let en2 = self.valid1 && !(self.valid2 && !out_ready);

        let next_valid1 = if !out_ready && self.valid1 && self.valid2 {
            self.valid1
        } else {
            in_valid
        };
        let next_valid2 = if !out_ready && self.valid2 { self.valid2 } else { self.valid1 };

        // Register 2 latches from the old register 1.
        if en2 {
            self.data2 = f_stage2(&self.data1);
        }
        if en1 {
            self.data1 = f_stage1(&in_data);
        }
        self.valid1 = next_valid1;
        self.valid2 = next_valid2;
        en1
    }

    pub fn reset(&mut self) {
        self.valid1 = false;
        self.valid2 = false;
    }

    /// Raw valid bits, for occupancy displays.
    #[inline]
    pub fn valids(&self) -> (bool, bool) {
        (self.valid1, self.valid2)
    }
}
