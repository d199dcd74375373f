use h3o::CellIndex;

use super::ids::LinkId;

/// A location on the road network: the link an entity is on and its cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPosition {
    pub link_id: LinkId,
    pub cell: CellIndex,
}

impl EntityPosition {
    pub fn new(link_id: LinkId, cell: CellIndex) -> Self {
        Self { link_id, cell }
    }
}
