use crate::config::InputConfig;
use crate::memory::ioregisters::{IoRegister, IoRegisters};
use sdl2::keyboard::Keycode;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

#[derive(Error, Debug)]
pub enum KeyMapError {
    #[error("invalid keycode in input config: {keycode}")]
    InvalidKeycode { keycode: String },
    #[error("keycode used for multiple buttons: {keycode}")]
    DuplicateKeycode { keycode: String },
}

fn try_parse_keycode(s: &str) -> Result<Keycode, KeyMapError> {
    Keycode::from_name(s).ok_or_else(|| KeyMapError::InvalidKeycode { keycode: s.into() })
}

macro_rules! build_key_map {
    ($($config_field:expr => $button:expr),+$(,)?) => {
        {
            let mut map = HashMap::new();

            $(
                let keycode = try_parse_keycode(&$config_field)?;
                if map.insert(keycode, $button).is_some() {
                    return Err(KeyMapError::DuplicateKeycode { keycode: keycode.name() });
                }
            )*

            map
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyMap(HashMap<Keycode, Button>);

impl KeyMap {
    pub fn from_config(input_config: &InputConfig) -> Result<Self, KeyMapError> {
        let map = build_key_map!(
            input_config.up => Button::Up,
            input_config.down => Button::Down,
            input_config.left => Button::Left,
            input_config.right => Button::Right,
            input_config.a => Button::A,
            input_config.b => Button::B,
            input_config.start => Button::Start,
            input_config.select => Button::Select,
        );

        Ok(Self(map))
    }
}

/// The instantaneous state of the eight keys, maintained from host keyboard
/// events.
#[derive(Debug, Clone, Default)]
pub struct JoypadState {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    a: bool,
    b: bool,
    start: bool,
    select: bool,
}

impl JoypadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, keycode: Keycode, key_map: &KeyMap) {
        self.set_button(keycode, key_map, true);
    }

    pub fn key_up(&mut self, keycode: Keycode, key_map: &KeyMap) {
        self.set_button(keycode, key_map, false);
    }

    fn set_button(&mut self, keycode: Keycode, key_map: &KeyMap, pressed: bool) {
        let Some(&button) = key_map.0.get(&keycode) else {
            return;
        };

        log::debug!("button {button:?} pressed={pressed}");

        match button {
            Button::Up => self.up = pressed,
            Button::Down => self.down = pressed,
            Button::Left => self.left = pressed,
            Button::Right => self.right = pressed,
            Button::A => self.a = pressed,
            Button::B => self.b = pressed,
            Button::Start => self.start = pressed,
            Button::Select => self.select = pressed,
        }
    }
}

/// Rewrite the P1 register from the current key state. The low four bits are
/// first set (released); when bit 4 is low the direction keys are XORed in,
/// and when bit 5 is low the button keys are, so a low bit reads as pressed.
pub fn update_joyp_register(joypad_state: &JoypadState, io_registers: &mut IoRegisters) {
    let mut p1 = io_registers.read_register(IoRegister::P1) | 0x0F;

    if p1 & 0x10 == 0 {
        p1 ^= (u8::from(joypad_state.down) << 3)
            | (u8::from(joypad_state.up) << 2)
            | (u8::from(joypad_state.left) << 1)
            | u8::from(joypad_state.right);
    }

    if p1 & 0x20 == 0 {
        p1 ^= (u8::from(joypad_state.start) << 3)
            | (u8::from(joypad_state.select) << 2)
            | (u8::from(joypad_state.b) << 1)
            | u8::from(joypad_state.a);
    }

    io_registers.write_register(IoRegister::P1, p1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_key_map() -> KeyMap {
        KeyMap::from_config(&InputConfig::default()).unwrap()
    }

    #[test]
    fn default_bindings_resolve() {
        default_key_map();
    }

    #[test]
    fn duplicate_binding_is_an_error() {
        let config = InputConfig { a: "Up".into(), ..InputConfig::default() };
        assert!(matches!(
            KeyMap::from_config(&config),
            Err(KeyMapError::DuplicateKeycode { .. })
        ));
    }

    #[test]
    fn unknown_binding_is_an_error() {
        let config = InputConfig { b: "NotAKey".into(), ..InputConfig::default() };
        assert!(matches!(KeyMap::from_config(&config), Err(KeyMapError::InvalidKeycode { .. })));
    }

    #[test]
    fn direction_keys_read_low_when_selected() {
        let key_map = default_key_map();
        let mut joypad_state = JoypadState::new();
        let mut io_registers = IoRegisters::new();

        joypad_state.key_down(Keycode::Left, &key_map);

        // Select the direction group (bit 4 low)
        io_registers.write_register(IoRegister::P1, 0x20);
        update_joyp_register(&joypad_state, &mut io_registers);
        assert_eq!(0x2D, io_registers.read_register(IoRegister::P1));

        joypad_state.key_up(Keycode::Left, &key_map);
        update_joyp_register(&joypad_state, &mut io_registers);
        assert_eq!(0x2F, io_registers.read_register(IoRegister::P1));
    }

    #[test]
    fn button_keys_read_low_when_selected() {
        let key_map = default_key_map();
        let mut joypad_state = JoypadState::new();
        let mut io_registers = IoRegisters::new();

        joypad_state.key_down(Keycode::Return, &key_map);
        joypad_state.key_down(Keycode::Q, &key_map);

        // Select the button group (bit 5 low)
        io_registers.write_register(IoRegister::P1, 0x10);
        update_joyp_register(&joypad_state, &mut io_registers);
        assert_eq!(0x16, io_registers.read_register(IoRegister::P1));
    }

    #[test]
    fn unselected_groups_read_high() {
        let key_map = default_key_map();
        let mut joypad_state = JoypadState::new();
        let mut io_registers = IoRegisters::new();

        joypad_state.key_down(Keycode::Q, &key_map);

        io_registers.write_register(IoRegister::P1, 0x30);
        update_joyp_register(&joypad_state, &mut io_registers);
        assert_eq!(0x3F, io_registers.read_register(IoRegister::P1));
    }
}
