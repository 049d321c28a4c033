#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    PowerUp, // cold boot / power cycle
    Soft,    // regular reset, RAM preserved
}
