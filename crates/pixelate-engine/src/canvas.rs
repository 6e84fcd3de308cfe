//! Pixel storage shared by the scheduler's workers.
//!
//! [`Canvas`] keeps one `AtomicU32` per pixel (RGB packed into the low
//! 24 bits), so any worker can read and write any pixel through a shared
//! reference without a lock. Bands are disjoint except where a block
//! straddles a seam; there two workers may write the same pixels and the
//! last store wins.
//!
//! [`PixelGrid`] abstracts over the canvas and a plain [`RgbImage`] so
//! the block averager runs unchanged on either.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::{Dimensions, Rgb, RgbImage};

/// Read/write access to a rectangular grid of RGB pixels.
pub trait PixelGrid {
    /// Width and height of the grid.
    fn dimensions(&self) -> Dimensions;

    /// Read the pixel at `(x, y)`. Coordinates must be in bounds.
    fn pixel(&self, x: u32, y: u32) -> Rgb<u8>;

    /// Overwrite the pixel at `(x, y)`. Coordinates must be in bounds.
    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb<u8>);
}

impl PixelGrid for RgbImage {
    fn dimensions(&self) -> Dimensions {
        Dimensions::of(self)
    }

    fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        *self.get_pixel(x, y)
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb<u8>) {
        self.put_pixel(x, y, color);
    }
}

/// An RGB buffer writable from many threads at once.
#[derive(Debug)]
pub struct Canvas {
    dimensions: Dimensions,
    cells: Vec<AtomicU32>,
}

impl Canvas {
    /// Copy an image into a new canvas.
    #[must_use]
    pub fn from_image(image: &RgbImage) -> Self {
        let cells = image
            .pixels()
            .map(|p| AtomicU32::new(pack(*p)))
            .collect();
        Self {
            dimensions: Dimensions::of(image),
            cells,
        }
    }

    /// Width and height of the canvas.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Read one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Rgb<u8> {
        unpack(self.cells[self.index(x, y)].load(Ordering::Relaxed))
    }

    /// Write one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn set(&self, x: u32, y: u32, color: Rgb<u8>) {
        self.cells[self.index(x, y)].store(pack(color), Ordering::Relaxed);
    }

    /// Copy the current contents into a fresh image.
    ///
    /// Pixels written concurrently with the copy may show either their
    /// old or new value.
    #[must_use]
    pub fn snapshot(&self) -> RgbImage {
        let mut image = RgbImage::new(self.dimensions.width, self.dimensions.height);
        self.write_to(&mut image);
        image
    }

    /// Copy the current contents into `image`, which must have the same
    /// dimensions as the canvas.
    pub fn write_to(&self, image: &mut RgbImage) {
        debug_assert_eq!(Dimensions::of(image), self.dimensions);
        for (pixel, cell) in image.pixels_mut().zip(&self.cells) {
            *pixel = unpack(cell.load(Ordering::Relaxed));
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.dimensions.width && y < self.dimensions.height);
        y as usize * self.dimensions.width as usize + x as usize
    }
}

/// Workers hold `&Canvas`; writing through a shared reference is what
/// lets several bands touch the same seam rows.
impl PixelGrid for &Canvas {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        self.get(x, y)
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb<u8>) {
        self.set(x, y, color);
    }
}

fn pack(Rgb([r, g, b]): Rgb<u8>) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

#[allow(clippy::cast_possible_truncation)]
const fn unpack(packed: u32) -> Rgb<u8> {
    Rgb([(packed >> 16) as u8, (packed >> 8) as u8, packed as u8])
}
