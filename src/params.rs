//! User-editable generation parameters.

/// Range and step of one slider
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliderSpec<T> {
    pub min: T,
    pub max: T,
    pub step: T,
}

impl<T: PartialOrd + Copy> SliderSpec<T> {
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const NUM_IMAGES: SliderSpec<u32> = SliderSpec { min: 1, max: 5, step: 1 };
pub const IMAGE_RESOLUTION: SliderSpec<u32> = SliderSpec { min: 256, max: 768, step: 128 };
pub const NUM_STEPS: SliderSpec<u32> = SliderSpec { min: 1, max: 100, step: 5 };
pub const SEED: SliderSpec<u32> = SliderSpec { min: 0, max: 84, step: 2 };
pub const GUIDANCE_SCALE: SliderSpec<f32> = SliderSpec { min: 0.1, max: 30.0, step: 0.1 };

/// Resolution the backend preprocesses the scribble at; not user editable
pub const PREPROCESS_RESOLUTION: u32 = 512;

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub additional_prompt: String,
    pub negative_prompt: String,
    pub num_images: u32,
    pub image_resolution: u32,
    pub num_steps: u32,
    pub guidance_scale: f32,
    pub seed: u32,
    /// Draw a fresh seed for every request instead of using `seed`
    pub random_seed: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            additional_prompt: String::new(),
            negative_prompt: String::new(),
            num_images: 3,
            image_resolution: 512,
            num_steps: 25,
            guidance_scale: 15.0,
            seed: 42,
            random_seed: false,
        }
    }
}

impl GenerationParams {
    /// Pull every numeric field back into its slider range
    pub fn clamp_to_ranges(&mut self) {
        self.num_images = NUM_IMAGES.clamp(self.num_images);
        self.image_resolution = IMAGE_RESOLUTION.clamp(self.image_resolution);
        self.num_steps = NUM_STEPS.clamp(self.num_steps);
        self.seed = SEED.clamp(self.seed);
        self.guidance_scale = GUIDANCE_SCALE.clamp(self.guidance_scale);
    }

    /// Seed to send with the next request
    pub fn effective_seed(&self) -> u32 {
        if self.random_seed {
            let slots = (SEED.max - SEED.min) / SEED.step;
            SEED.min + fastrand::u32(0..=slots) * SEED.step
        } else {
            self.seed
        }
    }
}
