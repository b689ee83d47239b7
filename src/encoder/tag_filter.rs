use crate::tags::Group;

/// Decides which entries describe image data rather than metadata.
///
/// Image tags of an existing image are not rewritten from metadata records; they are copied
/// from the original tree so the image data stays intact.
pub trait ImagePolicy {
    fn is_image_tag(&self, tag: u16, group: Group, primary_groups: &[Group]) -> bool;
}

/// For metadata without image data of its own, such as Exif in a JPEG file.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoImageTags;

impl ImagePolicy for NoImageTags {
    fn is_image_tag(&self, _: u16, _: Group, _: &[Group]) -> bool {
        false
    }
}

/// A filter of the tags that make up the image data of a TIFF file.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageTagFilter;

impl ImageTagFilter {
    /// Return the filter shared by all TIFF-like images.
    pub fn tiff() -> &'static ImageTagFilter {
        static INSTANCE: ImageTagFilter = ImageTagFilter;
        &INSTANCE
    }

    /// As per EXIF V3.0 tags, Primary Image (0th IFD), and the TIFF/EP additions.
    pub(crate) fn filter_primary(&self, tag: u16) -> Level {
        match tag {
            // subfile types, width, height, bits per sample, compression
            0x00fe..=0x0103 => Level::SampleLayout,
            // photometric interpretation, thresholding, cell size, fill order
            0x0106..=0x010a => Level::Photometric,
            // data tied to the camera and customized description, potentially PI.
            0x010e..=0x0110 => Level::Value,
            // strip offsets
            0x0111 => Level::SampleLayout,
            // orientation
            0x0112 => Level::Value,
            // samples per pixel, rows per strip, strip byte counts, min and max sample values
            0x0115..=0x0119 => Level::SampleLayout,
            // pixel dimensions (ratio).
            0x011a..=0x011b => Level::SampleLayout,
            // planar configuration
            0x011c => Level::SampleLayout,
            // gray response, T4 and T6 options
            0x0122..=0x0125 => Level::Photometric,
            // units for 0x011a,0x011b
            0x0128 => Level::SampleLayout,
            // page number
            0x0129 => Level::SampleLayout,
            // transfer function
            0x012d => Level::Photometric,
            // file data time, software pipeline.
            0x0131..=0x0132 => Level::Value,
            // artist
            0x013b => Level::Value,
            // predictor
            0x013d => Level::SampleLayout,
            // whitepoint, chromaticities, color map, halftone hints
            0x013e..=0x0141 => Level::Photometric,
            // tile layout and tile offsets/byte counts
            0x0142..=0x0145 => Level::SampleLayout,
            // ink set and ink names, number of inks, dot range
            0x014c..=0x0150 => Level::Photometric,
            // extra samples, sample format, min and max sample values, transfer range
            0x0152..=0x0156 => Level::SampleLayout,
            // indexed, JPEG tables
            0x015a..=0x015b => Level::SampleLayout,
            // old-style JPEG compression parameters
            0x0200..=0x0209 => Level::SampleLayout,
            // YCbCr coefficients, subsampling, positioning, reference black and white
            0x0211..=0x0214 => Level::Photometric,
            // Copyright holder (not same as artist).
            0x8298 => Level::Value,
            // CFA repeat pattern and pattern
            0x828d..=0x828e => Level::SampleLayout,
            0x8769 | 0x8825 => Level::Value,
            // sensing method of TIFF/EP
            0x9217 => Level::Photometric,
            _ => Level::Unknown,
        }
    }
}

impl ImagePolicy for ImageTagFilter {
    /// Without primary groups the image tags are those of the first directory. With primary
    /// groups, those of the primary groups.
    fn is_image_tag(&self, tag: u16, group: Group, primary_groups: &[Group]) -> bool {
        let in_primary = if primary_groups.is_empty() {
            group == Group::Ifd0
        } else {
            primary_groups.contains(&group)
        };

        in_primary
            && matches!(
                self.filter_primary(tag),
                Level::SampleLayout | Level::Photometric
            )
    }
}

/// The role of a tag of the primary image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Level {
    Unknown,
    /// Value describes the image data layout. It is only valid together with that data.
    SampleLayout,
    /// Value is needed to interpret the samples of the image data.
    Photometric,
    /// This is a value we know of.
    Value,
}
