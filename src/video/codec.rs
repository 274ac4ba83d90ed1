use ffmpeg_next as ffmpeg;
use ffmpeg_next::{
    codec::{self, context::Context as CodecCtx},
    encoder,
    format::{self, Pixel},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{context::Context as SwsCtx, flag::Flags},
    Packet, Rational,
};
use image::RgbImage;
use std::fs;
use std::path::Path;

use super::{output_size, FrameAnnotator};
use crate::config::AppConfig;
use crate::detect::Detector;
use crate::error::{Error, Result};

/// Used when the container does not report a frame rate.
const DEFAULT_FPS: f64 = 25.0;

fn av(context: &'static str) -> impl Fn(ffmpeg::Error) -> Error {
    move |e| Error::Video(format!("{context}: {e}"))
}

pub fn annotate_video(input: &Path, output: &Path, cfg: &AppConfig, detector: &dyn Detector) -> Result<u64> {
    ffmpeg::init().map_err(av("init"))?;

    let mut ictx = format::input(input)
        .map_err(|e| Error::Video(format!("cannot open {}: {e}", input.display())))?;

    // The stream borrow must end before `ictx.packets()` borrows mutably.
    let (stream_idx, fps_in, mut decoder) = {
        let stream = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| Error::Video("no video stream found".to_string()))?;
        let r = stream.avg_frame_rate();
        let fps = if r.1 != 0 && r.0 > 0 {
            r.0 as f64 / r.1 as f64
        } else {
            log::warn!("could not read FPS from {}, using {DEFAULT_FPS}", input.display());
            DEFAULT_FPS
        };
        let dec = CodecCtx::from_parameters(stream.parameters())
            .map_err(av("codec context"))?
            .decoder()
            .video()
            .map_err(av("video decoder"))?;
        (stream.index(), fps, dec)
    };

    let (w_in, h_in) = (decoder.width(), decoder.height());
    let out_size = output_size(w_in, h_in, cfg.video_max_width);
    let fps = cfg.fps_out.filter(|f| *f > 0.0).unwrap_or(fps_in);
    log::info!(
        "{}: {w_in}x{h_in} @ {fps_in:.2} fps -> {}x{} @ {fps:.2} fps",
        input.display(),
        out_size.0,
        out_size.1
    );

    let mut to_rgb = SwsCtx::get(decoder.format(), w_in, h_in, Pixel::RGB24, w_in, h_in, Flags::BILINEAR)
        .map_err(av("scaler init"))?;

    let annotator = FrameAnnotator::new(detector, cfg.conf, cfg.square_size, out_size);
    let mut writer = VideoWriter::create(output, out_size, fps)?;

    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_idx {
            continue;
        }
        if let Err(e) = decoder.send_packet(&packet) {
            log::warn!("skipping undecodable packet: {e}");
            continue;
        }
        drain_decoder(&mut decoder, &mut to_rgb, &annotator, &mut writer)?;
    }
    decoder.send_eof().map_err(av("flush decoder"))?;
    drain_decoder(&mut decoder, &mut to_rgb, &annotator, &mut writer)?;

    let frames = writer.finish()?;
    log::info!("Annotated video written: {} ({frames} frames)", output.display());
    Ok(frames)
}

fn drain_decoder(
    decoder: &mut ffmpeg::decoder::Video,
    to_rgb: &mut SwsCtx,
    annotator: &FrameAnnotator,
    writer: &mut VideoWriter,
) -> Result<()> {
    let mut decoded = VideoFrame::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let mut rgb = VideoFrame::empty();
        to_rgb.run(&decoded, &mut rgb).map_err(av("pixel convert"))?;
        writer.write(&annotator.annotate(&frame_to_image(&rgb)?))?;
        if writer.frames % 50 == 0 {
            log::info!("processed {} frames...", writer.frames);
        }
    }
    Ok(())
}

/// Copy an RGB24 frame out, stripping per-row padding if the stride is wider
/// than a row.
fn frame_to_image(frame: &VideoFrame) -> Result<RgbImage> {
    let (width, height) = (frame.width(), frame.height());
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = frame.data(0);

    let mut flat = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        if end > data.len() {
            return Err(Error::Video(format!(
                "frame row {row} out of bounds (stride={stride}, data.len()={})",
                data.len()
            )));
        }
        flat.extend_from_slice(&data[start..end]);
    }
    RgbImage::from_raw(width, height, flat)
        .ok_or_else(|| Error::Video("frame buffer size mismatch".to_string()))
}

fn image_to_frame(img: &RgbImage) -> VideoFrame {
    let (width, height) = img.dimensions();
    let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = frame.data_mut(0);
    for (row, src) in img.as_raw().chunks_exact(row_bytes).enumerate() {
        data[row * stride..row * stride + row_bytes].copy_from_slice(src);
    }
    frame
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// H.264 when the FFmpeg build has an encoder for it, MPEG-4 Part 2 otherwise.
struct VideoWriter {
    octx: format::context::Output,
    encoder: encoder::video::Encoder,
    to_yuv: SwsCtx,
    ost_index: usize,
    time_base: Rational,
    ost_time_base: Rational,
    frames: u64,
}

impl VideoWriter {
    fn create(output: &Path, (width, height): (u32, u32), fps: f64) -> Result<Self> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut octx = format::output(output)
            .map_err(|e| Error::Video(format!("cannot create {}: {e}", output.display())))?;

        let codec = encoder::find(codec::Id::H264)
            .or_else(|| encoder::find(codec::Id::MPEG4))
            .ok_or_else(|| Error::Video("no H.264 or MPEG-4 encoder available".to_string()))?;
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

        let frame_rate = Rational::from(fps);
        let time_base = frame_rate.invert();

        let mut enc = CodecCtx::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(av("video encoder"))?;
        enc.set_width(width);
        enc.set_height(height);
        enc.set_format(Pixel::YUV420P);
        enc.set_time_base(time_base);
        enc.set_frame_rate(Some(frame_rate));
        if global_header {
            enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = enc.open_as(codec).map_err(av("open encoder"))?;

        let ost_index = {
            let mut ost = octx.add_stream(codec).map_err(av("add stream"))?;
            ost.set_parameters(&encoder);
            ost.set_time_base(time_base);
            ost.index()
        };
        octx.write_header().map_err(av("write header"))?;
        // The muxer may pick its own time base while writing the header.
        let ost_time_base = octx
            .stream(ost_index)
            .map(|s| s.time_base())
            .unwrap_or(time_base);

        let to_yuv = SwsCtx::get(Pixel::RGB24, width, height, Pixel::YUV420P, width, height, Flags::BILINEAR)
            .map_err(av("scaler init"))?;

        Ok(Self {
            octx,
            encoder,
            to_yuv,
            ost_index,
            time_base,
            ost_time_base,
            frames: 0,
        })
    }

    fn write(&mut self, img: &RgbImage) -> Result<()> {
        let mut yuv = VideoFrame::empty();
        self.to_yuv
            .run(&image_to_frame(img), &mut yuv)
            .map_err(av("pixel convert"))?;
        yuv.set_pts(Some(self.frames as i64));
        self.encoder.send_frame(&yuv).map_err(av("encode"))?;
        self.frames += 1;
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.ost_index);
            packet.rescale_ts(self.time_base, self.ost_time_base);
            packet.write_interleaved(&mut self.octx).map_err(av("write packet"))?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.encoder.send_eof().map_err(av("flush encoder"))?;
        self.drain()?;
        self.octx.write_trailer().map_err(av("write trailer"))?;
        Ok(self.frames)
    }
}
