use std::collections::HashMap;

use glam::Vec2;

use super::types::{ButtonState, InputEvent, Key, MouseButton};

/// Logical actions scenes react to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Action {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    ShowMenu,
    ShowInfo,
    Attack,
    Select,
    Click,
    Cancel,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::MoveUp,
        Action::MoveDown,
        Action::MoveLeft,
        Action::MoveRight,
        Action::ShowMenu,
        Action::ShowInfo,
        Action::Attack,
        Action::Select,
        Action::Click,
        Action::Cancel,
    ];
}

/// Where an action is triggered from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Binding {
    Key(Key),
    Mouse(MouseButton),
}

/// Per-tick state of one action.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum ActionState {
    #[default]
    None,
    /// Went down during this tick.
    Press,
    /// Down since an earlier tick.
    Held,
    /// Went up during this tick.
    Release,
}

/// Translates input events into action states.
///
/// Transitions recorded from events are visible until [`advance`](Self::advance)
/// runs at the end of the tick: `Press` becomes `Held`, `Release` becomes `None`.
#[derive(Debug, Clone)]
pub struct ActionMap {
    bindings: HashMap<Binding, Vec<Action>>,
    states: HashMap<Action, ActionState>,
    pointer: Vec2,
    quit: bool,
}

impl Default for ActionMap {
    fn default() -> Self {
        let mut map = Self::unbound();
        map.bind(Binding::Key(Key::W), Action::MoveUp);
        map.bind(Binding::Key(Key::S), Action::MoveDown);
        map.bind(Binding::Key(Key::A), Action::MoveLeft);
        map.bind(Binding::Key(Key::D), Action::MoveRight);
        map.bind(Binding::Key(Key::Q), Action::ShowMenu);
        map.bind(Binding::Key(Key::E), Action::ShowInfo);
        map.bind(Binding::Mouse(MouseButton::Left), Action::Attack);
        map.bind(Binding::Mouse(MouseButton::Left), Action::Select);
        map.bind(Binding::Mouse(MouseButton::Left), Action::Click);
        map.bind(Binding::Mouse(MouseButton::Right), Action::Cancel);
        map
    }
}

impl ActionMap {
    /// A map with no bindings.
    pub fn unbound() -> Self {
        Self {
            bindings: HashMap::new(),
            states: Action::ALL.iter().map(|a| (*a, ActionState::None)).collect(),
            pointer: Vec2::ZERO,
            quit: false,
        }
    }

    pub fn bind(&mut self, binding: Binding, action: Action) {
        let actions = self.bindings.entry(binding).or_default();
        if !actions.contains(&action) {
            actions.push(action);
        }
    }

    pub fn unbind(&mut self, binding: Binding) {
        self.bindings.remove(&binding);
    }

    /// Applies one event.
    pub fn apply(&mut self, event: &InputEvent) {
        match event {
            InputEvent::Key { key, state, repeat } => {
                self.trigger(Binding::Key(*key), *state, *repeat);
            }
            InputEvent::PointerButton { button, state } => {
                self.trigger(Binding::Mouse(*button), *state, false);
            }
            InputEvent::PointerMoved { x, y } => self.pointer = Vec2::new(*x, *y),
            InputEvent::Focused(false) => {
                // Nothing arrives for keys released while unfocused.
                for state in self.states.values_mut() {
                    if matches!(state, ActionState::Press | ActionState::Held) {
                        *state = ActionState::Release;
                    }
                }
            }
            InputEvent::Focused(true) => {}
            InputEvent::CloseRequested => self.quit = true,
        }
    }

    fn trigger(&mut self, binding: Binding, button: ButtonState, repeat: bool) {
        let Some(actions) = self.bindings.get(&binding) else {
            return;
        };
        for action in actions {
            let state = self.states.entry(*action).or_default();
            *state = match (button, repeat) {
                (ButtonState::Pressed, true) => ActionState::Held,
                (ButtonState::Pressed, false) if *state == ActionState::Held => ActionState::Held,
                (ButtonState::Pressed, false) => ActionState::Press,
                (ButtonState::Released, _) => ActionState::Release,
            };
        }
    }

    /// Ends the tick.
    pub fn advance(&mut self) {
        for state in self.states.values_mut() {
            *state = match *state {
                ActionState::Press => ActionState::Held,
                ActionState::Release => ActionState::None,
                other => other,
            };
        }
    }

    pub fn state(&self, action: Action) -> ActionState {
        self.states.get(&action).copied().unwrap_or_default()
    }

    /// Down this tick, newly or not.
    pub fn is_pressed(&self, action: Action) -> bool {
        matches!(self.state(action), ActionState::Press | ActionState::Held)
    }

    pub fn is_held(&self, action: Action) -> bool {
        self.state(action) == ActionState::Held
    }

    pub fn is_released(&self, action: Action) -> bool {
        self.state(action) == ActionState::Release
    }

    /// Last pointer position in logical pixels.
    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: Key, state: ButtonState) -> InputEvent {
        InputEvent::Key { key, state, repeat: false }
    }

    #[test]
    fn press_hold_release_cycle() {
        let mut map = ActionMap::default();

        map.apply(&key(Key::W, ButtonState::Pressed));
        assert_eq!(map.state(Action::MoveUp), ActionState::Press);
        assert!(map.is_pressed(Action::MoveUp));

        map.advance();
        assert!(map.is_held(Action::MoveUp));
        assert!(map.is_pressed(Action::MoveUp));

        map.apply(&key(Key::W, ButtonState::Released));
        assert!(map.is_released(Action::MoveUp));
        map.advance();
        assert_eq!(map.state(Action::MoveUp), ActionState::None);
    }

    #[test]
    fn key_repeat_counts_as_held() {
        let mut map = ActionMap::default();
        map.apply(&InputEvent::Key { key: Key::D, state: ButtonState::Pressed, repeat: true });
        assert!(map.is_held(Action::MoveRight));
    }

    #[test]
    fn mouse_left_drives_three_actions() {
        let mut map = ActionMap::default();
        map.apply(&InputEvent::PointerButton {
            button: MouseButton::Left,
            state: ButtonState::Pressed,
        });

        for action in [Action::Attack, Action::Select, Action::Click] {
            assert_eq!(map.state(action), ActionState::Press, "{action:?}");
        }
        assert_eq!(map.state(Action::Cancel), ActionState::None);
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let mut map = ActionMap::default();
        map.apply(&key(Key::Z, ButtonState::Pressed));
        assert!(Action::ALL.iter().all(|a| map.state(*a) == ActionState::None));

        map.unbind(Binding::Key(Key::W));
        map.apply(&key(Key::W, ButtonState::Pressed));
        assert_eq!(map.state(Action::MoveUp), ActionState::None);
    }

    #[test]
    fn focus_loss_releases_everything() {
        let mut map = ActionMap::default();
        map.apply(&key(Key::A, ButtonState::Pressed));
        map.apply(&InputEvent::Focused(false));
        assert!(map.is_released(Action::MoveLeft));
    }

    #[test]
    fn pointer_and_quit() {
        let mut map = ActionMap::default();
        map.apply(&InputEvent::PointerMoved { x: 12.0, y: 34.5 });
        assert_eq!(map.pointer(), Vec2::new(12.0, 34.5));

        assert!(!map.quit_requested());
        map.apply(&InputEvent::CloseRequested);
        assert!(map.quit_requested());
    }
}
