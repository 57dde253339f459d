use std::collections::HashMap;

use trellis_core::TypeRef;

#[derive(Clone, Debug)]
pub struct Local {
    pub slot: u16,
    pub ty: TypeRef,
}

/// Lexical scopes of one template: a stack of frames, innermost last.
///
/// Every binding gets a fresh slot, so slots are never shared between
/// variables even after their frame is popped.
#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<HashMap<String, Local>>,
    next_slot: u16,
    iterator_depth: u16,
    max_iterators: u16,
}

impl Scopes {
    /// A scope stack whose outermost frame holds the template parameters.
    pub fn with_params<'a>(params: impl IntoIterator<Item = (&'a str, TypeRef)>) -> Self {
        let mut scopes = Self {
            frames: vec![HashMap::new()],
            ..Self::default()
        };
        for (name, ty) in params {
            scopes.declare(name, ty);
        }
        scopes
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&Local> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Bind `name` in the innermost frame.
    pub fn declare(&mut self, name: &str, ty: TypeRef) -> u16 {
        let slot = self.fresh_slot();
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), Local { slot, ty });
        }
        slot
    }

    /// A slot no variable name can reach.
    pub fn fresh_slot(&mut self) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    pub fn enter_loop(&mut self) -> u16 {
        let slot = self.iterator_depth;
        self.iterator_depth += 1;
        self.max_iterators = self.max_iterators.max(self.iterator_depth);
        slot
    }

    pub fn exit_loop(&mut self) {
        self.iterator_depth = self.iterator_depth.saturating_sub(1);
    }

    pub fn locals(&self) -> u16 {
        self.next_slot
    }

    pub fn iterators(&self) -> u16 {
        self.max_iterators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_frames_shadow_and_unwind() {
        let mut scopes = Scopes::with_params([("name", TypeRef::string())]);
        assert_eq!(scopes.lookup("name").map(|l| l.slot), Some(0));

        scopes.push();
        let shadow = scopes.declare("name", TypeRef::int());
        assert_eq!(shadow, 1);
        assert_eq!(scopes.lookup("name").map(|l| l.ty.clone()), Some(TypeRef::int()));
        scopes.pop();

        assert_eq!(scopes.lookup("name").map(|l| l.ty.clone()), Some(TypeRef::string()));
        assert_eq!(scopes.declare("other", TypeRef::int()), 2);
        assert_eq!(scopes.locals(), 3);
    }

    #[test]
    fn test_iterator_slots_track_nesting_depth() {
        let mut scopes = Scopes::default();
        assert_eq!(scopes.enter_loop(), 0);
        assert_eq!(scopes.enter_loop(), 1);
        scopes.exit_loop();
        scopes.exit_loop();
        assert_eq!(scopes.enter_loop(), 0);
        assert_eq!(scopes.iterators(), 2);
    }
}
