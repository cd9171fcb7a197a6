/// A single captured or decoded frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the pipeline treats
/// pixel data as opaque apart from overlay drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Checked constructor for buffers coming from outside the process.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, index: usize) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            channels: 3,
            index,
        })
    }

    pub fn from_image(img: image::RgbImage, index: usize) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// A non-empty 3-channel buffer whose length matches its dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.channels == 3
            && self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let offset = self.offset(x, y)?;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Writes one pixel; coordinates outside the frame are ignored.
    pub fn set_pixel(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(offset) = self.offset(x as u32, y as u32) {
            self.data[offset..offset + 3].copy_from_slice(&color);
        }
    }

    /// Fills the half-open box `[x0, x1) x [y0, y1)`, clipped to the frame.
    pub fn fill_box(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 3]) {
        let x0 = x0.clamp(0, self.width as i64);
        let x1 = x1.clamp(0, self.width as i64);
        let y0 = y0.clamp(0, self.height as i64);
        let y1 = y1.clamp(0, self.height as i64);
        for y in y0..y1 {
            for x in x0..x1 {
                self.set_pixel(x, y, color);
            }
        }
    }

    pub fn to_image(&self) -> Option<image::RgbImage> {
        if !self.is_well_formed() {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Bilinear resize; returns `None` for malformed frames or zero target size.
    pub fn resized(&self, width: u32, height: u32) -> Option<Frame> {
        if width == 0 || height == 0 {
            return None;
        }
        let img = self.to_image()?;
        let scaled =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Some(Frame::from_image(scaled, self.index))
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height || self.channels < 3 {
            return None;
        }
        Some(((y as usize) * (self.width as usize) + x as usize) * self.channels as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_from_rgb_rejects_wrong_length() {
        assert!(Frame::from_rgb(vec![0u8; 10], 2, 2, 0).is_none());
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 0).is_some());
    }

    #[test]
    fn test_empty_frame_is_not_well_formed() {
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert!(!frame.is_well_formed());
    }

    #[test]
    fn test_set_pixel_and_read_back() {
        let mut frame = Frame::new(vec![0u8; 12], 2, 2, 3, 0);
        frame.set_pixel(1, 0, [10, 20, 30]);
        assert_eq!(frame.pixel(1, 0), Some([10, 20, 30]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn test_set_pixel_out_of_bounds_is_ignored() {
        let mut frame = Frame::new(vec![0u8; 12], 2, 2, 3, 0);
        frame.set_pixel(-1, 0, [255, 255, 255]);
        frame.set_pixel(2, 1, [255, 255, 255]);
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_box_is_clipped() {
        let mut frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, 0);
        frame.fill_box(2, 2, 10, 10, [1, 2, 3]);
        assert_eq!(frame.pixel(3, 3), Some([1, 2, 3]));
        assert_eq!(frame.pixel(1, 1), Some([0, 0, 0]));
    }

    #[test]
    fn test_with_index_keeps_pixels() {
        let frame = Frame::new(vec![7u8; 12], 2, 2, 3, 0).with_index(9);
        assert_eq!(frame.index(), 9);
        assert!(frame.data().iter().all(|&b| b == 7));
    }

    #[test]
    fn test_resized_dimensions() {
        let frame = Frame::new(vec![100u8; 8 * 6 * 3], 8, 6, 3, 3);
        let small = frame.resized(4, 3).unwrap();
        assert_eq!((small.width(), small.height()), (4, 3));
        assert_eq!(small.index(), 3);
        assert_eq!(small.pixel(0, 0), Some([100, 100, 100]));
    }

    #[test]
    fn test_image_conversion_preserves_pixels() {
        let mut frame = Frame::new(vec![0u8; 12], 2, 2, 3, 0);
        frame.set_pixel(1, 1, [50, 100, 200]);
        let img = frame.to_image().unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [50, 100, 200]);
        assert_eq!(Frame::from_image(img, 0), frame);
    }
}
