//! The playback coordinator's state machine.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistState {
    Booting,
    Playing,
    Swapping,
    Refetching,
    Exiting,
}
