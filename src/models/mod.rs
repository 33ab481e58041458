pub mod object;
pub mod state;
pub mod triple;

pub use object::{
    ChangeAction, Location, Meta, Node, OsmId, OsmKind, OsmObject, Relation, RelationMember, Way,
};
pub use state::DatabaseState;
pub use triple::Triple;
