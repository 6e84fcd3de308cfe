//! Progress sinks for the command line.
//!
//! [`TerminalPreview`] draws each snapshot with Unicode upper-half blocks
//! (`▀`): one character cell covers two image rows, the top pixel as the
//! foreground color and the bottom pixel as the background, in 24-bit
//! ANSI color. [`LogProgress`] only logs every tenth of the run.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use pixelate_engine::{DisplaySink, Frame, RgbImage};

/// Redraw at most this often, except for the final frame.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(33);

/// Live half-block rendering of the image being pixelated.
pub struct TerminalPreview<W: Write> {
    out: W,
    min_interval: Duration,
    last_draw: Option<Instant>,
    /// Lines printed by the previous draw, used to move the cursor back.
    drawn_lines: usize,
    failed: bool,
}

impl TerminalPreview<io::Stderr> {
    /// Preview on stderr, leaving stdout for the run report.
    pub fn stderr() -> Self {
        Self::new(io::stderr(), DEFAULT_MIN_INTERVAL)
    }
}

impl<W: Write> TerminalPreview<W> {
    pub const fn new(out: W, min_interval: Duration) -> Self {
        Self {
            out,
            min_interval,
            last_draw: None,
            drawn_lines: 0,
            failed: false,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn due(&self, frame: &Frame<'_>) -> bool {
        frame.is_complete()
            || self
                .last_draw
                .is_none_or(|at| at.elapsed() >= self.min_interval)
    }

    fn draw(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        let mut buf = Vec::new();
        if self.drawn_lines > 0 {
            write!(buf, "\x1b[{}A\r", self.drawn_lines)?;
        }
        let rows = render_half_blocks(frame.snapshot, &mut buf)?;
        writeln!(
            buf,
            "\x1b[2K{}/{} blocks ({:.0}%)",
            frame.blocks_done,
            frame.blocks_total,
            frame.fraction() * 100.0
        )?;
        self.out.write_all(&buf)?;
        self.out.flush()?;
        self.drawn_lines = rows + 1;
        Ok(())
    }
}

impl<W: Write> DisplaySink for TerminalPreview<W> {
    fn update(&mut self, frame: &Frame<'_>) {
        if self.failed || !self.due(frame) {
            return;
        }
        if let Err(e) = self.draw(frame) {
            // A closed terminal should not abort the run; stop drawing.
            tracing::warn!(error = %e, "terminal preview disabled");
            self.failed = true;
            return;
        }
        self.last_draw = Some(Instant::now());
    }
}

/// Write `image` as rows of `▀` cells and return the number of lines
/// written.
///
/// An odd final image row is drawn over the terminal's default
/// background.
pub fn render_half_blocks(image: &RgbImage, out: &mut impl Write) -> io::Result<usize> {
    let (width, height) = image.dimensions();
    let mut lines = 0;
    for y in (0..height).step_by(2) {
        for x in 0..width {
            let [r, g, b] = image.get_pixel(x, y).0;
            if y + 1 < height {
                let [br, bg, bb] = image.get_pixel(x, y + 1).0;
                write!(out, "\x1b[38;2;{r};{g};{b};48;2;{br};{bg};{bb}m▀")?;
            } else {
                write!(out, "\x1b[38;2;{r};{g};{b};49m▀")?;
            }
        }
        writeln!(out, "\x1b[0m")?;
        lines += 1;
    }
    Ok(lines)
}

/// Logs progress at every 10% step.
#[derive(Debug, Default)]
pub struct LogProgress {
    next_step: u32,
}

impl DisplaySink for LogProgress {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn update(&mut self, frame: &Frame<'_>) {
        // fraction() is clamped to [0, 1], so this is 0..=10.
        let step = (frame.fraction() * 10.0).floor() as u32;
        if step < self.next_step {
            return;
        }
        tracing::info!(
            blocks_done = frame.blocks_done,
            blocks_total = frame.blocks_total,
            percent = step * 10,
            "pixelating"
        );
        self.next_step = step + 1;
    }
}
