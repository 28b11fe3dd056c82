// Dynamic linker
//
// decodebin exposes its output pads only after it has looked at the stream,
// so the decoder → first consumer link is made from the pad-added callback.
// The decision itself is a pure function of the new pad's caps and whether
// the consumer's sink pad is already taken.

use gstreamer as gst;
use gstreamer::prelude::*;

/// What to do with a freshly exposed decoder pad
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDecision {
    Link,
    /// The consumer already has its input
    AlreadyLinked,
    /// Audio, subtitles or anything else that is not video
    NotVideo(String),
}

/// Decide from the pad's media type and the consumer's link state
pub fn decide(media_type: Option<&str>, sink_linked: bool) -> LinkDecision {
    match media_type {
        Some(name) if name.starts_with("video/") => {
            if sink_linked {
                LinkDecision::AlreadyLinked
            } else {
                LinkDecision::Link
            }
        }
        Some(name) => LinkDecision::NotVideo(name.to_string()),
        None => LinkDecision::NotVideo("unknown".into()),
    }
}

/// Media type of a pad, from negotiated caps when present
pub fn pad_media_type(pad: &gst::Pad) -> Option<String> {
    let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
    caps.structure(0).map(|s| s.name().to_string())
}

/// Wire `decoder`'s video pad to `consumer` whenever one appears
///
/// A failed link cannot be returned from the callback, so it is posted to
/// the bus as an element error and ends the run through the dispatcher.
pub fn connect_decoder(decoder: &gst::Element, consumer: &gst::Element) {
    let consumer_weak = consumer.downgrade();
    decoder.connect_pad_added(move |decoder, src_pad| {
        let Some(consumer) = consumer_weak.upgrade() else {
            return;
        };
        let Some(sink_pad) = consumer.static_pad("sink") else {
            log::error!("{} has no sink pad", consumer.name());
            return;
        };

        let media_type = pad_media_type(src_pad);
        match decide(media_type.as_deref(), sink_pad.is_linked()) {
            LinkDecision::Link => match src_pad.link(&sink_pad) {
                Ok(_) => log::info!(
                    "Linked {}:{} to {}",
                    decoder.name(),
                    src_pad.name(),
                    consumer.name()
                ),
                Err(e) => {
                    log::error!("Failed to link decoder pad: {:?}", e);
                    gst::element_error!(
                        decoder,
                        gst::CoreError::Negotiation,
                        (
                            "GST Pipeline elements could not be linked: {} to {}",
                            decoder.name(),
                            consumer.name()
                        ),
                        ["pad link returned {:?}", e]
                    );
                }
            },
            LinkDecision::AlreadyLinked => {
                log::debug!("{} already linked, ignoring {}", consumer.name(), src_pad.name());
            }
            LinkDecision::NotVideo(name) => {
                log::debug!("Ignoring non-video pad with caps '{}'", name);
            }
        }
    });
}
