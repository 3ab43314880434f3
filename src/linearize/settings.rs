/// Knobs for the linearizer
pub struct Settings {
    /// Re-check the output against the input after every method
    ///
    /// Mismatches are reported but the new body is kept regardless.
    pub validate: bool,

    /// Lay out loops the way `javac` does, keeping the body of a loop right after its header
    /// even when that costs an extra `goto`
    ///
    /// Turning this off can eliminate a few more jumps, but it moves code around a lot more.
    pub loop_layout_tiebreak: bool,

    /// Always keep a block that already falls through next to its successor (when the successor
    /// hasn't been placed yet)
    ///
    /// This is what makes running the linearizer on its own output a no-op.
    pub honour_fallthrough: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            validate: true,
            loop_layout_tiebreak: true,
            honour_fallthrough: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
