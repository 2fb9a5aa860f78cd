use whiteboard_core::{ConnectionId, PageIndex, ShapeId};

/// State changes of the local replica for the rendering layer
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    /// The whole replica was replaced by a server snapshot
    SnapshotReplaced { pages: usize },
    StrokeAdded {
        page: PageIndex,
        user_id: ConnectionId,
    },
    ShapeAdded {
        page: PageIndex,
        shape_id: ShapeId,
        user_id: ConnectionId,
    },
    ShapeMerged {
        page: PageIndex,
        shape_id: ShapeId,
        user_id: ConnectionId,
    },
    PageCleared { page: PageIndex },
    PageCountChanged { total_pages: usize },
    ParticipantJoined { user_id: ConnectionId },
    ParticipantLeft { user_id: ConnectionId },
    /// The displayed page followed a remote participant's navigation
    PageFollowed {
        page: PageIndex,
        user_id: ConnectionId,
    },
    /// A local gesture was abandoned because its target went away
    GestureCancelled { page: PageIndex },
}
