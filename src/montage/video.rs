use super::ImageAsset;
use super::config::MontageConfig;
use super::error::{MontageError, Result, skip_failed_images};
use anyhow::Context;
use ffmpeg::{ChannelLayout, Dictionary, Packet, Rational, codec, encoder, filter, format, frame};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const AUDIO_SAMPLE_RATE: i32 = 44_100;
const AUDIO_BIT_RATE: usize = 192_000;

/// Initialize FFmpeg. Safe to call more than once.
pub fn init_ffmpeg() -> anyhow::Result<()> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;

    Ok(())
}

/// Container duration in seconds
pub fn probe_duration<P: AsRef<Path>>(media_path: P) -> anyhow::Result<f64> {
    let input = ffmpeg::format::input(&media_path).context("Failed to open media file")?;

    let duration = input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);

    Ok(duration)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineSettings {
    /// Seconds per image when no total duration was requested
    pub default_clip_seconds: f64,
    pub height: u32,
    pub fps: i32,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            default_clip_seconds: 2.0,
            height: 480,
            fps: 24,
        }
    }
}

impl From<&MontageConfig> for TimelineSettings {
    fn from(config: &MontageConfig) -> Self {
        Self {
            default_clip_seconds: config.default_clip_seconds,
            height: config.video_height,
            fps: config.fps,
        }
    }
}

/// Seconds each image stays on screen: an even share of the target when
/// there is one, otherwise the default
pub fn clip_duration(target_duration: Option<f64>, count: usize, default_seconds: f64) -> f64 {
    match target_duration {
        Some(total) if total > 0.0 && count > 0 => total / count as f64,
        _ => default_seconds,
    }
}

/// One still held on screen, already composed onto the output canvas
#[derive(Debug, Clone)]
pub struct Segment {
    pub frame: RgbImage,
    pub seconds: f64,
}

/// Stills played back to back with hard cuts.
///
/// Every still is scaled to the output height; narrower ones are centered
/// on black so all frames share the widest still's width.
#[derive(Debug, Clone)]
pub struct Timeline {
    segments: Vec<Segment>,
    width: u32,
    height: u32,
    fps: i32,
}

impl Timeline {
    pub fn assemble(
        images: &[ImageAsset],
        target_duration: Option<f64>,
        settings: &TimelineSettings,
    ) -> Result<Self> {
        let height = settings.height.max(2).div_ceil(2) * 2;

        let stills = skip_failed_images(
            images
                .iter()
                .map(|image| image.load_rgb().map(|rgb| scale_to_height(&rgb, height))),
            "video clip",
        )?;

        if stills.is_empty() {
            return Err(MontageError::NoValidImages);
        }

        // yuv420p needs even dimensions
        let widest = stills.iter().map(|still| still.width()).max().unwrap_or(2);
        let width = widest.div_ceil(2) * 2;

        let seconds = clip_duration(target_duration, stills.len(), settings.default_clip_seconds);

        let segments = stills
            .iter()
            .map(|still| Segment {
                frame: center_on_canvas(still, width, height),
                seconds,
            })
            .collect();

        Ok(Self {
            segments,
            width,
            height,
            fps: settings.fps.max(1),
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> i32 {
        self.fps
    }

    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|segment| segment.seconds).sum()
    }

    /// Half-open frame index range of each segment. Boundaries are rounded
    /// from the running total so the frame count tracks the duration.
    pub fn frame_spans(&self) -> Vec<(i64, i64)> {
        let fps = f64::from(self.fps);
        let mut spans = Vec::with_capacity(self.segments.len());
        let mut elapsed = 0.0;
        let mut start = 0i64;

        for segment in &self.segments {
            elapsed += segment.seconds;
            let end = ((elapsed * fps).round() as i64).max(start);
            spans.push((start, end));
            start = end;
        }

        spans
    }

    pub fn frame_count(&self) -> i64 {
        self.frame_spans().last().map(|(_, end)| *end).unwrap_or(0)
    }
}

fn scale_to_height(rgb: &RgbImage, height: u32) -> RgbImage {
    let (width, source_height) = rgb.dimensions();
    let scaled_width = (f64::from(width) * f64::from(height) / f64::from(source_height))
        .round()
        .max(1.0) as u32;

    imageops::resize(rgb, scaled_width, height, FilterType::Triangle)
}

fn center_on_canvas(still: &RgbImage, width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::new(width, height);
    let x = (width - still.width()) / 2;
    let y = (height - still.height()) / 2;
    imageops::replace(&mut canvas, still, i64::from(x), i64::from(y));
    canvas
}

/// What was written by [`build_video`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub clip_seconds: f64,
    pub clip_count: usize,
    pub has_audio: bool,
}

/// Render `images` in order into an MP4 at `output`, replacing any earlier
/// file.
///
/// A `music` path that does not exist is ignored and the video is silent.
/// Otherwise the track is cut, or padded with silence, to the video length.
pub fn build_video(
    images: &[ImageAsset],
    target_duration: Option<f64>,
    music: Option<&Path>,
    output: &Path,
    settings: &TimelineSettings,
) -> Result<RenderedVideo> {
    let timeline = Timeline::assemble(images, target_duration, settings)?;
    let clip_seconds = timeline.segments()[0].seconds;

    let music = music.filter(|path| {
        let exists = path.is_file();
        if !exists {
            warn!("Music file {:?} not found, rendering silent video", path);
        }
        exists
    });

    info!(
        "Rendering {} clips at {:.3}s each ({:.3}s total, {})",
        timeline.segments().len(),
        clip_seconds,
        timeline.duration(),
        if music.is_some() { "with music" } else { "silent" }
    );

    encode(&timeline, music, output).map_err(MontageError::Encode)?;

    info!("Video written to {:?}", output);

    Ok(RenderedVideo {
        path: output.to_path_buf(),
        duration_seconds: timeline.duration(),
        clip_seconds,
        clip_count: timeline.segments().len(),
        has_audio: music.is_some(),
    })
}

/// Encode into a temp file beside `output` and move it into place only
/// once the trailer is written
fn encode(timeline: &Timeline, music: Option<&Path>, output: &Path) -> anyhow::Result<()> {
    init_ffmpeg()?;

    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).context("Failed to create output directory")?;

    let staged = tempfile::Builder::new()
        .prefix(".montage-")
        .suffix(".mp4")
        .tempfile_in(dir)
        .context("Failed to create temporary video file")?;

    {
        let mut octx =
            format::output(staged.path()).context("Failed to create output container")?;

        let (width, height) = timeline.dimensions();
        let mut video = VideoTrack::open(&mut octx, width, height, timeline.fps())?;
        let mut audio = match music {
            Some(path) => Some(AudioTrack::open(&mut octx, path, timeline.duration())?),
            None => None,
        };

        octx.write_header().context("Failed to write container header")?;
        video.stream_time_base = stream_time_base(&octx, video.stream_index)?;
        if let Some(audio) = audio.as_mut() {
            audio.stream_time_base = stream_time_base(&octx, audio.stream_index)?;
        }

        let fps = f64::from(timeline.fps());
        for (segment, (start, end)) in timeline.segments().iter().zip(timeline.frame_spans()) {
            let mut yuv = video.convert(&segment.frame)?;
            debug!("Segment frames {}..{}", start, end);

            for index in start..end {
                yuv.set_pts(Some(index));
                video.send(&yuv, &mut octx)?;

                if let Some(audio) = audio.as_mut() {
                    audio.encode_until((index + 1) as f64 / fps, &mut octx)?;
                }
            }
        }

        video.finish(&mut octx)?;
        if let Some(audio) = audio.as_mut() {
            audio.finish(&mut octx)?;
        }

        octx.write_trailer().context("Failed to write container trailer")?;
    }

    staged
        .persist(output)
        .map_err(|err| err.error)
        .with_context(|| format!("Failed to move video into {:?}", output))?;

    Ok(())
}

fn stream_time_base(octx: &format::context::Output, index: usize) -> anyhow::Result<Rational> {
    octx.stream(index)
        .map(|stream| stream.time_base())
        .context("Output stream disappeared after header")
}

fn wants_global_header(octx: &format::context::Output) -> bool {
    octx.format()
        .flags()
        .contains(format::flag::Flags::GLOBAL_HEADER)
}

struct VideoTrack {
    encoder: encoder::Video,
    scaler: ffmpeg::software::scaling::context::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
}

impl VideoTrack {
    fn open(
        octx: &mut format::context::Output,
        width: u32,
        height: u32,
        fps: i32,
    ) -> anyhow::Result<Self> {
        let global_header = wants_global_header(octx);
        let codec = encoder::find(codec::Id::H264)
            .or_else(|| encoder::find(codec::Id::MPEG4))
            .context("No H.264 or MPEG-4 encoder available")?;
        let time_base = Rational::new(1, fps);

        let mut stream = octx.add_stream(codec).context("Failed to add video stream")?;
        let stream_index = stream.index();

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("Failed to create video encoder")?;
        video.set_width(width);
        video.set_height(height);
        video.set_format(format::Pixel::YUV420P);
        video.set_time_base(time_base);
        video.set_frame_rate(Some(Rational::new(fps, 1)));
        if global_header {
            video.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        options.set("preset", "medium");
        let encoder = video
            .open_with(options)
            .context("Failed to open video encoder")?;

        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        let scaler = ffmpeg::software::scaling::context::Context::get(
            format::Pixel::RGB24,
            width,
            height,
            format::Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("Failed to create scaler")?;

        Ok(Self {
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base: time_base,
            width,
            height,
        })
    }

    /// Copy an RGB canvas into an FFmpeg frame and convert it to YUV420P
    fn convert(&mut self, canvas: &RgbImage) -> anyhow::Result<frame::Video> {
        let mut rgb = frame::Video::new(format::Pixel::RGB24, self.width, self.height);
        let stride = rgb.stride(0);
        let row_bytes = self.width as usize * 3;
        let data = rgb.data_mut(0);

        for (y, row) in canvas.as_raw().chunks_exact(row_bytes).enumerate() {
            data[y * stride..y * stride + row_bytes].copy_from_slice(row);
        }

        let mut yuv = frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("Failed to scale frame")?;

        Ok(yuv)
    }

    fn send(
        &mut self,
        frame: &frame::Video,
        octx: &mut format::context::Output,
    ) -> anyhow::Result<()> {
        self.encoder
            .send_frame(frame)
            .context("Failed to encode video frame")?;
        self.write_packets(octx)
    }

    fn finish(&mut self, octx: &mut format::context::Output) -> anyhow::Result<()> {
        self.encoder.send_eof().context("Failed to flush video encoder")?;
        self.write_packets(octx)
    }

    fn write_packets(&mut self, octx: &mut format::context::Output) -> anyhow::Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(octx)
                .context("Failed to write video packet")?;
        }
        Ok(())
    }
}

/// Music decoded and shaped by a filter graph:
/// source file -> pad with silence -> trim to video length -> AAC input format
struct AudioTrack {
    graph: filter::Graph,
    encoder: encoder::Audio,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    samples_sent: i64,
    finished: bool,
}

impl AudioTrack {
    fn open(
        octx: &mut format::context::Output,
        music: &Path,
        seconds: f64,
    ) -> anyhow::Result<Self> {
        let global_header = wants_global_header(octx);
        let codec = encoder::find(codec::Id::AAC).context("No AAC encoder available")?;
        let time_base = Rational::new(1, AUDIO_SAMPLE_RATE);

        let mut stream = octx.add_stream(codec).context("Failed to add audio stream")?;
        let stream_index = stream.index();

        let mut audio = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .context("Failed to create audio encoder")?;
        audio.set_rate(AUDIO_SAMPLE_RATE);
        audio.set_ch_layout(ChannelLayout::STEREO);
        audio.set_format(format::Sample::F32(format::sample::Type::Planar));
        audio.set_bit_rate(AUDIO_BIT_RATE);
        audio.set_time_base(time_base);
        if global_header {
            audio.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let encoder = audio.open_as(codec).context("Failed to open AAC encoder")?;

        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        let graph = music_graph(music, seconds, encoder.frame_size())
            .with_context(|| format!("Failed to load music {:?}", music))?;

        Ok(Self {
            graph,
            encoder,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base: time_base,
            samples_sent: 0,
            finished: false,
        })
    }

    /// Encode music until it covers `seconds` of output or runs out
    fn encode_until(
        &mut self,
        seconds: f64,
        octx: &mut format::context::Output,
    ) -> anyhow::Result<()> {
        let rate = f64::from(AUDIO_SAMPLE_RATE);

        while !self.finished && (self.samples_sent as f64) / rate < seconds {
            let mut samples = frame::Audio::empty();
            let pulled = self
                .graph
                .get("out")
                .context("Audio filter output missing")?
                .sink()
                .frame(&mut samples);

            match pulled {
                Ok(()) => {
                    samples.set_pts(Some(self.samples_sent));
                    self.samples_sent += samples.samples() as i64;
                    self.encoder
                        .send_frame(&samples)
                        .context("Failed to encode audio frame")?;
                    self.write_packets(octx)?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.encoder.send_eof().context("Failed to flush audio encoder")?;
                    self.write_packets(octx)?;
                    self.finished = true;
                }
                Err(err) => return Err(err).context("Failed to read music samples"),
            }
        }

        Ok(())
    }

    fn finish(&mut self, octx: &mut format::context::Output) -> anyhow::Result<()> {
        self.encode_until(f64::INFINITY, octx)
    }

    fn write_packets(&mut self, octx: &mut format::context::Output) -> anyhow::Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(octx)
                .context("Failed to write audio packet")?;
        }
        Ok(())
    }
}

fn music_graph(music: &Path, seconds: f64, frame_size: u32) -> anyhow::Result<filter::Graph> {
    let mut graph = filter::Graph::new();

    let sink = filter::find("abuffersink").context("abuffersink filter unavailable")?;
    graph
        .add(&sink, "out", "")
        .context("Failed to add audio sink")?;

    let graph_desc = format!(
        "amovie={},apad,atrim=duration={:.6},\
         aformat=sample_fmts=fltp:sample_rates={}:channel_layouts=stereo",
        escape_filter_path(music),
        seconds,
        AUDIO_SAMPLE_RATE
    );
    debug!("Audio filter graph: {}", graph_desc);

    graph
        .input("out", 0)
        .and_then(|parser| parser.parse(&graph_desc))
        .context("Failed to parse audio filter graph")?;
    graph.validate().context("Invalid audio filter graph")?;

    // the AAC encoder only takes fixed-size frames
    if frame_size > 0 {
        graph
            .get("out")
            .context("Audio filter output missing")?
            .sink()
            .set_frame_size(frame_size);
    }

    Ok(graph)
}

/// Escape a path for use as a filter option inside a filter graph
/// description. Option values and the graph itself are unescaped once each.
fn escape_filter_path(path: &Path) -> String {
    let value = path.to_string_lossy();
    let option_level = escape_chars(&value, &['\\', '\'', ':']);
    escape_chars(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
