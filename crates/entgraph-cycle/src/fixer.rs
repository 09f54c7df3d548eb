//! In-memory relation wiring.

use entgraph_core::EntityRef;

/// Wires a resolved target into one relation of a source entity.
///
/// A fixer mutates the graph (assigns a reference, pushes into a collection)
/// and never touches the database. For to-many relations it is called once per
/// resolved pair and is responsible for accumulating.
///
/// Any `Fn(&EntityRef<S>, &EntityRef<T>) + Send + Sync` closure is a fixer:
///
/// ```ignore
/// let fixer = |person: &EntityRef<Person>, mentor: &EntityRef<Person>| {
///     person.write().mentor = Some(mentor.clone());
/// };
/// ```
pub trait RelationFixer<S, T>: Send + Sync {
    /// Wire `target` into `source`.
    fn apply(&self, source: &EntityRef<S>, target: &EntityRef<T>);
}

impl<S, T, F> RelationFixer<S, T> for F
where
    F: Fn(&EntityRef<S>, &EntityRef<T>) + Send + Sync,
{
    fn apply(&self, source: &EntityRef<S>, target: &EntityRef<T>) {
        self(source, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Folder {
        children: Vec<EntityRef<Folder>>,
    }

    fn attach<F: RelationFixer<Folder, Folder>>(fixer: &F, source: &EntityRef<Folder>, target: &EntityRef<Folder>) {
        fixer.apply(source, target);
    }

    #[test]
    fn test_closure_fixer_accumulates() {
        let parent = EntityRef::new(Folder::default());
        let a = EntityRef::new(Folder::default());
        let b = EntityRef::new(Folder::default());
        let push = |src: &EntityRef<Folder>, trg: &EntityRef<Folder>| src.write().children.push(trg.clone());

        attach(&push, &parent, &a);
        attach(&push, &parent, &b);

        let children = &parent.read().children;
        assert_eq!(children.len(), 2);
        assert!(children[0].same_entity(&a));
        assert!(children[1].same_entity(&b));
    }
}
