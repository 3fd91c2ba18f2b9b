//! `OpenCV` backends for the camera, the display and the face detector.

use crate::{
    devices::{Camera, Display, DisplayEvent, FaceDetector, Overlay},
    frame::{BoundingBox, Frame, FrameShape},
    utils::{
        image_conversion::{frame_to_mat, mat_to_frame},
        safe_cast::usize_to_i32,
    },
    Error, Result,
};
use log::{debug, info};
use opencv::{
    core::{Mat, Point, Rect, Scalar, Size, Vector},
    highgui::{self, WINDOW_NORMAL},
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};

const WINDOW_NAME: &str = "Face Tracker";

/// Webcam frames resized to a fixed shape
pub struct OpenCvCamera {
    capture: VideoCapture,
    shape: FrameShape,
    raw: Mat,
    resized: Mat,
}

impl OpenCvCamera {
    /// Open camera `index` and request the given geometry
    ///
    /// # Errors
    ///
    /// Returns a camera error if the device cannot be opened
    pub fn open(index: i32, shape: FrameShape, fps: f64) -> Result<Self> {
        info!("Opening camera {index}");
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::Camera(format!("Camera {index} could not be opened")));
        }
        capture.set(CAP_PROP_FRAME_WIDTH, f64::from(usize_to_i32(shape.width)?))?;
        capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(usize_to_i32(shape.height)?))?;
        capture.set(CAP_PROP_FPS, fps)?;
        // Keep only the newest frame buffered
        capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
        Ok(Self {
            capture,
            shape,
            raw: Mat::default(),
            resized: Mat::default(),
        })
    }
}

impl Camera for OpenCvCamera {
    fn read(&mut self) -> Result<Frame> {
        if !self.capture.read(&mut self.raw)? || self.raw.empty() {
            return Err(Error::Camera("Failed to read frame".to_string()));
        }
        let width = usize_to_i32(self.shape.width)?;
        let height = usize_to_i32(self.shape.height)?;
        if self.raw.cols() == width && self.raw.rows() == height {
            return mat_to_frame(&self.raw, self.shape);
        }
        imgproc::resize(
            &self.raw,
            &mut self.resized,
            Size::new(width, height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        mat_to_frame(&self.resized, self.shape)
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        Ok(())
    }
}

fn to_rect(bbox: &BoundingBox) -> Result<Rect> {
    let conv = |v: i64| i32::try_from(v).map_err(|_| Error::InvalidInput(format!("Box edge {v} out of range")));
    Ok(Rect::new(
        conv(bbox.left)?,
        conv(bbox.top)?,
        conv(bbox.width())?,
        conv(bbox.height())?,
    ))
}

/// HighGUI window; `q`/Esc quits, `c` recenters the servos
pub struct HighGuiDisplay {
    open: bool,
}

impl HighGuiDisplay {
    /// Create the window
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be created
    pub fn new() -> Result<Self> {
        highgui::named_window(WINDOW_NAME, WINDOW_NORMAL)?;
        Ok(Self { open: true })
    }
}

impl Display for HighGuiDisplay {
    fn show(&mut self, frame: &Frame, overlay: &Overlay) -> Result<DisplayEvent> {
        let mut mat = frame_to_mat(frame)?;

        if let Some(bbox) = &overlay.detection {
            imgproc::rectangle(&mut mat, to_rect(bbox)?, Scalar::new(0.0, 255.0, 0.0, 0.0), 2, LINE_8, 0)?;
        }
        for (i, line) in overlay.lines().iter().enumerate() {
            let y = 30 + 25 * i32::try_from(i).unwrap_or(0);
            imgproc::put_text(
                &mut mat,
                line,
                Point::new(10, y),
                FONT_HERSHEY_SIMPLEX,
                0.7,
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                2,
                LINE_8,
                false,
            )?;
        }

        highgui::imshow(WINDOW_NAME, &mat).map_err(|e| Error::Display(e.to_string()))?;
        let key = highgui::wait_key(1)?;
        Ok(match key {
            27 => DisplayEvent::Quit,
            k if k == i32::from(b'q') => DisplayEvent::Quit,
            k if k == i32::from(b'c') => DisplayEvent::Recenter,
            _ => DisplayEvent::Continue,
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            highgui::destroy_window(WINDOW_NAME)?;
        }
        Ok(())
    }
}

/// Haar cascade face detector returning the largest face
pub struct CascadeFaceDetector {
    classifier: CascadeClassifier,
    min_face_size: i32,
    gray: Mat,
    equalized: Mat,
}

impl CascadeFaceDetector {
    /// Load a cascade from an XML file
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cascade cannot be loaded
    pub fn new(cascade_path: &str, min_face_size: u32) -> Result<Self> {
        info!("Loading face cascade from {cascade_path}");
        let classifier = CascadeClassifier::new(cascade_path)?;
        if classifier.empty()? {
            return Err(Error::Config(format!("Cascade '{cascade_path}' is empty or missing")));
        }
        Ok(Self {
            classifier,
            min_face_size: i32::try_from(min_face_size).unwrap_or(i32::MAX),
            gray: Mat::default(),
            equalized: Mat::default(),
        })
    }

    fn detect_faces(&mut self, frame: &Frame) -> Result<Vector<Rect>> {
        let mat = frame_to_mat(frame)?;
        imgproc::cvt_color(&mat, &mut self.gray, imgproc::COLOR_BGR2GRAY, 0)?;
        imgproc::equalize_hist(&self.gray, &mut self.equalized)?;

        let mut faces = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            &self.equalized,
            &mut faces,
            1.1,
            3,
            0,
            Size::new(self.min_face_size, self.min_face_size),
            Size::new(0, 0),
        )?;
        Ok(faces)
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<BoundingBox>> {
        let faces = self
            .detect_faces(frame)
            .map_err(|e| Error::Detection(e.to_string()))?;
        debug!("Cascade found {} faces", faces.len());

        Ok(faces
            .iter()
            .max_by_key(|r| i64::from(r.width) * i64::from(r.height))
            .map(|r| {
                BoundingBox::new(
                    i64::from(r.y),
                    i64::from(r.x) + i64::from(r.width),
                    i64::from(r.y) + i64::from(r.height),
                    i64::from(r.x),
                )
            }))
    }
}
