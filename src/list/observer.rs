use crate::model::Note;

/// Receives the two kinds of row interaction. `A` identifies the control the
/// secondary action originated from, so the receiver can anchor a menu to it.
pub trait NoteInteraction<A: ?Sized> {
    fn on_primary(&mut self, note: &Note);
    fn on_secondary(&mut self, note: &Note, anchor: &A);
}

/// Adapter turning a pair of closures into a [`NoteInteraction`].
pub struct InteractionFns<P, S> {
    primary: P,
    secondary: S,
}

impl<A, P, S> NoteInteraction<A> for InteractionFns<P, S>
where
    A: ?Sized,
    P: FnMut(&Note),
    S: FnMut(&Note, &A),
{
    fn on_primary(&mut self, note: &Note) {
        (self.primary)(note)
    }

    fn on_secondary(&mut self, note: &Note, anchor: &A) {
        (self.secondary)(note, anchor)
    }
}

pub fn interaction_fn<A, P, S>(primary: P, secondary: S) -> InteractionFns<P, S>
where
    A: ?Sized,
    P: FnMut(&Note),
    S: FnMut(&Note, &A),
{
    InteractionFns { primary, secondary }
}
