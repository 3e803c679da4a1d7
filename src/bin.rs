// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use player_texture::*;
use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;

fn main() {
    let _time = std::time::Instant::now();

    let _ = simple_log::new(simple_log::LogConfig::default());

    let source = std::env::args().nth(1).unwrap_or_else(|| "testsrc=size=640x360:rate=30:duration=3".to_string());

    let device = GraphicsDevice::system_default().unwrap_or(GraphicsDevice::Headless);
    let mut adapter = PlaybackTextureAdapter::new(0, device);

    let resized = Rc::new(Cell::new(None));
    let resized2 = resized.clone();
    adapter.set_size_change_handler(move |change: SizeChange| {
        println!("Video size changed to {}x{}", change.width, change.height);
        resized2.set(Some((change.width, change.height)));
    });

    if let Err(e) = adapter.set_source(&source) {
        log::error!("Failed to open {source}: {e}");
        return;
    }
    println!("{:?}", adapter.video_info());

    if let Err(e) = adapter.play() {
        log::error!("Failed to start playback: {e}");
        return;
    }

    let mut written = 0;
    while adapter.is_playing() {
        if resized.take().is_some() {
            match adapter.create_output_texture() {
                Ok(texture) => println!("Output texture: {texture:?}"),
                Err(e) => log::error!("Failed to allocate output texture: {e}"),
            }
        }
        match adapter.update_frame() {
            Ok(true) => {
                written += 1;
                log::debug!("Frame written at {:.3}s", adapter.current_seconds());
            },
            Ok(false) => { },
            Err(e) => log::warn!("update_frame: {e}"),
        }
        std::thread::sleep(std::time::Duration::from_millis(4));
    }

    adapter.shutdown();

    println!("Wrote {written} frames in {:.3}s ", _time.elapsed().as_millis() as f64 / 1000.0);
    let _ = std::io::stdout().flush();
}
