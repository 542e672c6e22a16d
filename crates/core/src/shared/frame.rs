use ndarray::ArrayView3;

/// A decoded still, burst member, GIF frame or video frame: contiguous
/// interleaved bytes in row-major order, top row first.
///
/// `index` is the frame's position in its source sequence (0 for stills).
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

    /// Builds a frame from caller-supplied pixels, rejecting buffers that do
    /// not describe a decodable image instead of panicking.
    pub fn from_raw(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("image has zero dimension ({width}x{height})"));
        }
        if channels != 3 {
            return Err(format!("expected 3 channels, got {channels}"));
        }
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(format!(
                "pixel buffer holds {} bytes, expected {expected}",
                data.len()
            ));
        }
        Ok(Self::new(data, width, height, channels, 0))
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
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

    /// A frame the detector can run on: non-empty and consistent.
    pub fn is_decodable(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.channels > 0
            && self.data.len()
                == (self.width as usize) * (self.height as usize) * (self.channels as usize)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixel rectangle `[x, x+w) × [y, y+h)`, clamped to the frame.
    pub fn crop(&self, x: i32, y: i32, w: i32, h: i32) -> Frame {
        let x1 = x.clamp(0, self.width as i32) as usize;
        let y1 = y.clamp(0, self.height as i32) as usize;
        let x2 = (x + w).clamp(x1 as i32, self.width as i32) as usize;
        let y2 = (y + h).clamp(y1 as i32, self.height as i32) as usize;

        let channels = self.channels as usize;
        let row_bytes = self.width as usize * channels;
        let mut data = Vec::with_capacity((x2 - x1) * (y2 - y1) * channels);
        for row in y1..y2 {
            let start = row * row_bytes + x1 * channels;
            let end = row * row_bytes + x2 * channels;
            data.extend_from_slice(&self.data[start..end]);
        }

        Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        )
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
