pub mod basic_functions;

pub use basic_functions::{
    base64_encode_image, format_image_for_model, load_and_encode_all_images, load_yaml_to_json,
};
