mod audio;
mod video;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;
use pixels::{Pixels, SurfaceTexture};
use winit::{
    event::{ElementState, Event, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

use tempo_emu_core::cartridge::Cartridge;
use tempo_emu_core::gameboy::GameBoy;
use tempo_emu_core::input::Button;
use tempo_emu_core::ui::{LCD_HEIGHT, LCD_WIDTH};

use video::DesktopUi;

const SCALE: u32 = 3;

#[derive(Parser)]
struct Args {
    /// Path to the ROM file
    rom: PathBuf,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Run without a window or audio
    #[arg(long)]
    headless: bool,

    /// Number of frames to run in headless mode
    #[arg(long, default_value_t = 600)]
    frames: u64,
}

fn keycode_button(key: VirtualKeyCode) -> Option<Button> {
    match key {
        VirtualKeyCode::Right => Some(Button::Right),
        VirtualKeyCode::Left => Some(Button::Left),
        VirtualKeyCode::Up => Some(Button::Up),
        VirtualKeyCode::Down => Some(Button::Down),
        VirtualKeyCode::A => Some(Button::A),
        VirtualKeyCode::B => Some(Button::B),
        VirtualKeyCode::LShift | VirtualKeyCode::RShift => Some(Button::Select),
        VirtualKeyCode::Return => Some(Button::Start),
        _ => None,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let cart = match Cartridge::from_file(&args.rom) {
        Ok(cart) => cart,
        Err(e) => {
            eprintln!("{}: {e}", args.rom.display());
            return ExitCode::FAILURE;
        }
    };

    let cgb_mode = if args.dmg {
        false
    } else if args.cgb {
        true
    } else {
        cart.cgb
    };
    info!("starting in {} mode", if cgb_mode { "CGB" } else { "DMG" });

    let mut gb = GameBoy::new_with_mode(cart, DesktopUi::new(), cgb_mode);

    if args.headless {
        return run_headless(gb, args.frames);
    }

    let _stream = match audio::start_stream(gb.audio_consumer()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            log::warn!("audio unavailable: {e}");
            None
        }
    };

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("tempo-emu")
        .with_inner_size(winit::dpi::LogicalSize::new(
            (LCD_WIDTH as u32 * SCALE) as f64,
            (LCD_HEIGHT as u32 * SCALE) as f64,
        ))
        .build(&event_loop)
        .expect("failed to create window");

    let size = window.inner_size();
    let surface = SurfaceTexture::new(size.width, size.height, &window);
    let mut pixels = Pixels::new(LCD_WIDTH as u32, LCD_HEIGHT as u32, surface)
        .expect("failed to create render surface");

    let mut frame = vec![0u32; LCD_WIDTH * LCD_HEIGHT];

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => {
                    let _ = pixels.resize_surface(size.width, size.height);
                }
                WindowEvent::KeyboardInput { input, .. } => {
                    if let Some(key) = input.virtual_keycode {
                        let pressed = input.state == ElementState::Pressed;
                        if key == VirtualKeyCode::Escape {
                            if pressed {
                                gb.quit = true;
                            }
                        } else if let Some(button) = keycode_button(key) {
                            gb.ui().queue_button(button, pressed);
                        }
                    }
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                if gb.quit {
                    gb.shutdown();
                    *control_flow = ControlFlow::Exit;
                    return;
                }

                while !gb.ui().take_frame() {
                    if let Err(fault) = gb.run_chunk() {
                        eprintln!("{fault}");
                        gb.shutdown();
                        std::process::exit(1);
                    }
                }

                frame.copy_from_slice(gb.ui().framebuffer());
                window.request_redraw();
            }
            Event::RedrawRequested(_) => {
                pixels
                    .frame_mut()
                    .copy_from_slice(bytemuck::cast_slice(&frame));
                if pixels.render().is_err() {
                    *control_flow = ControlFlow::Exit;
                }
            }
            Event::LoopDestroyed => {
                gb.shutdown();
            }
            _ => {}
        }
    })
}

fn run_headless(mut gb: GameBoy<DesktopUi>, frames: u64) -> ExitCode {
    let mut rendered = 0u64;
    while rendered < frames {
        if let Err(fault) = gb.run_chunk() {
            eprintln!("{fault}");
            return ExitCode::FAILURE;
        }
        if gb.ui().take_frame() {
            rendered += 1;
        }
    }
    gb.shutdown();
    ExitCode::SUCCESS
}
