// THEORY (Packed Pixel):
// The `Pixel` is the smallest unit the compositing engines move around. Unlike an
// analysis pixel it carries no derived channels: the engines relocate whole pixels
// millions of times per frame, so a pixel is a single `u32` holding four 8-bit
// channels in RGBA byte order (red in the lowest byte). Copying one is a register move.
//
// The only heuristic that lives here is luma, the depth proxy. It is read once per
// pixel per pass from the depth buffer and must be exact at the extremes: pure white
// has luma 255 and pure black has luma 0. Computing the weighted sum in integer
// hundredths keeps that true without float rounding drifting white down to 254.
//
// Channel setters mask the untouched channels, so composing channels back into the
// packed value can never carry into a neighbour.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Luma = Byte;
    pub type Packed = u32;

    pub const CHANNELS: usize = 4;

    const RED_SHIFT: u32 = 0;
    const GREEN_SHIFT: u32 = 8;
    const BLUE_SHIFT: u32 = 16;
    const ALPHA_SHIFT: u32 = 24;

    // Luma weights in hundredths: 0.21 R + 0.72 G + 0.07 B.
    const LUMA_RED: u32 = 21;
    const LUMA_GREEN: u32 = 72;
    const LUMA_BLUE: u32 = 7;

    /// A single RGBA pixel packed into one 32-bit value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Pixel {
        pub value: Packed,
    }

    impl Pixel {
        /// Fully transparent black. Reads outside a buffer resolve to this when a
        /// sampler needs a concrete value.
        pub const TRANSPARENT: Pixel = Pixel { value: 0 };

        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                value: (red as Packed) << RED_SHIFT
                    | (green as Packed) << GREEN_SHIFT
                    | (blue as Packed) << BLUE_SHIFT
                    | (alpha as Packed) << ALPHA_SHIFT,
            }
        }

        /// An opaque gray pixel whose luma equals `level`.
        pub const fn gray(level: Channel) -> Self {
            Pixel::new(level, level, level, 255)
        }

        pub const fn from_packed(value: Packed) -> Self {
            Pixel { value }
        }

        #[inline]
        pub const fn red(&self) -> Channel {
            (self.value >> RED_SHIFT) as Channel
        }

        #[inline]
        pub const fn green(&self) -> Channel {
            (self.value >> GREEN_SHIFT) as Channel
        }

        #[inline]
        pub const fn blue(&self) -> Channel {
            (self.value >> BLUE_SHIFT) as Channel
        }

        #[inline]
        pub const fn alpha(&self) -> Channel {
            (self.value >> ALPHA_SHIFT) as Channel
        }

        pub fn set_red(&mut self, red: Channel) {
            self.set_channel(RED_SHIFT, red);
        }

        pub fn set_green(&mut self, green: Channel) {
            self.set_channel(GREEN_SHIFT, green);
        }

        pub fn set_blue(&mut self, blue: Channel) {
            self.set_channel(BLUE_SHIFT, blue);
        }

        pub fn set_alpha(&mut self, alpha: Channel) {
            self.set_channel(ALPHA_SHIFT, alpha);
        }

        #[inline]
        fn set_channel(&mut self, shift: u32, channel: Channel) {
            self.value = (self.value & !(0xFF << shift)) | (channel as Packed) << shift;
        }

        /// Perceived brightness used as the depth sample.
        ///
        /// Weighted 0.21 / 0.72 / 0.07 and truncated. Alpha does not contribute.
        #[inline]
        pub fn luma(&self) -> Luma {
            let weighted = LUMA_RED * self.red() as u32
                + LUMA_GREEN * self.green() as u32
                + LUMA_BLUE * self.blue() as u32;
            // Weights sum to 100, so the quotient is at most 255.
            (weighted / 100) as Luma
        }

        /// Replaces the color channels with `level`, keeping alpha.
        pub fn set_luma(&mut self, level: Luma) {
            self.set_red(level);
            self.set_green(level);
            self.set_blue(level);
        }

        pub const fn to_bytes(self) -> [Byte; CHANNELS] {
            [self.red(), self.green(), self.blue(), self.alpha()]
        }
    }

    impl From<[Byte; CHANNELS]> for Pixel {
        fn from(bytes: [Byte; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            pixel.to_bytes()
        }
    }

    impl From<image::Rgba<Byte>> for Pixel {
        fn from(rgba: image::Rgba<Byte>) -> Self {
            Pixel::from(rgba.0)
        }
    }

    impl From<Pixel> for image::Rgba<Byte> {
        fn from(pixel: Pixel) -> Self {
            image::Rgba(pixel.to_bytes())
        }
    }
}
