use sdl2::keyboard::Keycode;
use std::fmt::Formatter;

/// Key bindings, as SDL2 keycode names resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConfig {
    pub up: String,
    pub down: String,
    pub left: String,
    pub right: String,
    pub a: String,
    pub b: String,
    pub start: String,
    pub select: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            up: Keycode::Up.name(),
            down: Keycode::Down.name(),
            left: Keycode::Left.name(),
            right: Keycode::Right.name(),
            a: Keycode::Q.name(),
            b: Keycode::W.name(),
            start: Keycode::Return.name(),
            select: Keycode::Space.name(),
        }
    }
}

impl std::fmt::Display for InputConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Up={}, Down={}, Left={}, Right={}, A={}, B={}, Start={}, Select={}",
            self.up, self.down, self.left, self.right, self.a, self.b, self.start, self.select
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub rom_file_path: String,
    pub audio_enabled: bool,
    pub vsync_enabled: bool,
    pub display_scale: u32,
    pub input_config: InputConfig,
}

impl std::fmt::Display for RunConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rom_file_path: {}", self.rom_file_path)?;
        writeln!(f, "audio_enabled: {}", self.audio_enabled)?;
        writeln!(f, "vsync_enabled: {}", self.vsync_enabled)?;
        writeln!(f, "display_scale: {}", self.display_scale)?;
        writeln!(f, "input_config: {}", self.input_config)?;

        Ok(())
    }
}
