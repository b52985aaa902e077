use crate::ppu::{self, PpuState};
use crate::ConsoleMode;
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::render::{Texture, TextureCreator, TextureValueError, WindowCanvas};
use sdl2::video::{Window, WindowContext};
use sdl2::IntegerOrSdlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("error creating renderer: {source}")]
    CreateRenderer {
        #[from]
        source: IntegerOrSdlError,
    },
    #[error("error creating frame texture: {source}")]
    CreateTexture {
        #[from]
        source: TextureValueError,
    },
    #[error("error updating frame texture: {msg}")]
    Texture { msg: String },
    #[error("error copying frame texture to renderer: {msg}")]
    CopyToCanvas { msg: String },
}

// Monochrome shades 0..3, white through black
const DMG_SHADES: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

/// Create a renderer for the given window, cleared to white.
pub fn create_renderer(window: Window, vsync_enabled: bool) -> Result<WindowCanvas, GraphicsError> {
    let mut canvas_builder = window.into_canvas();
    if vsync_enabled {
        canvas_builder = canvas_builder.present_vsync();
    }

    let mut canvas = canvas_builder.build()?;

    canvas.set_draw_color(Color::RGB(255, 255, 255));
    canvas.clear();
    canvas.present();

    Ok(canvas)
}

pub fn create_frame_texture(
    texture_creator: &TextureCreator<WindowContext>,
) -> Result<Texture<'_>, GraphicsError> {
    let texture = texture_creator.create_texture_streaming(
        PixelFormatEnum::RGB24,
        ppu::SCREEN_WIDTH as u32,
        ppu::SCREEN_HEIGHT as u32,
    )?;

    Ok(texture)
}

fn expand_color_channel(value: u16) -> u8 {
    ((0xFF * u32::from(value)) / 0x1F) as u8
}

/// Copy the finished frame into the window. In color mode the 15-bit color
/// triples are scaled to 8 bits per channel; in monochrome mode the 2-bit
/// shade indexes a gray ramp. The texture is stretched over the whole
/// window, which startup sized at an integer multiple of the screen.
pub fn render_frame(
    console_mode: ConsoleMode,
    ppu_state: &PpuState,
    canvas: &mut WindowCanvas,
    texture: &mut Texture<'_>,
) -> Result<(), GraphicsError> {
    let frame_buffer = ppu_state.frame_buffer();

    texture
        .with_lock(None, |pixels: &mut [u8], pitch: usize| {
            for row in 0..ppu::SCREEN_HEIGHT {
                for column in 0..ppu::SCREEN_WIDTH {
                    let pixel = frame_buffer[row * ppu::SCREEN_WIDTH + column];

                    let [red, green, blue] = match console_mode {
                        ConsoleMode::Cgb => {
                            let color = pixel.cgb_color;
                            [
                                expand_color_channel(color & 0x001F),
                                expand_color_channel((color >> 5) & 0x001F),
                                expand_color_channel((color >> 10) & 0x001F),
                            ]
                        }
                        ConsoleMode::Dmg => {
                            let shade = DMG_SHADES[usize::from(pixel.dmg_color & 0x03)];
                            [shade, shade, shade]
                        }
                    };

                    let start = row * pitch + 3 * column;
                    pixels[start] = red;
                    pixels[start + 1] = green;
                    pixels[start + 2] = blue;
                }
            }
        })
        .map_err(|msg| GraphicsError::Texture { msg })?;

    canvas.clear();
    canvas.copy(texture, None, None).map_err(|msg| GraphicsError::CopyToCanvas { msg })?;
    canvas.present();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_channel_expansion_covers_full_range() {
        assert_eq!(0x00, expand_color_channel(0x00));
        assert_eq!(0xFF, expand_color_channel(0x1F));
        assert_eq!(0x7B, expand_color_channel(0x0F));
    }
}
