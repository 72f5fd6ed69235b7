//! Parse → generate → parse over a corpus of conforming playlists must
//! yield semantically equal structures with stable segment ordering.

use castbridge_core::playlist::{generate, parse, resolve_uri, Playlist};

const SIMPLE_VOD: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:8
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:8.000000,
segment_0.ts
#EXTINF:8.000000,
segment_1.ts
#EXTINF:5.500000,
segment_2.ts
#EXT-X-ENDLIST
";

const ENCRYPTED_VOD: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example/1\",IV=0x9c7db8778570d05c3f9ae7d7e26a
#EXTINF:6.006000,
chunk_00001.ts
#EXTINF:6.006000,
chunk_00002.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example/2\",IV=0x9c7db8778570d05c3f9ae7d7e26b
#EXTINF:3.003000,
chunk_00003.ts
#EXT-X-ENDLIST
";

const FMP4_VOD: &str = "#EXTM3U
#EXT-X-VERSION:6
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-MAP:URI=\"init.mp4\"
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:00.000+00:00
#EXTINF:4.000000,
seg-1.m4s
#EXT-X-BYTERANGE:75232@0
#EXTINF:4.000000,
seg-2.m4s
#EXT-X-DISCONTINUITY
#EXTINF:2.000000,
seg-3.m4s
#EXT-X-ENDLIST
";

const DEMUXED_MASTER: &str = "#EXTM3U
#EXT-X-VERSION:4
#EXT-X-INDEPENDENT-SEGMENTS
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"stereo\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=YES,AUTOSELECT=YES,URI=\"audio/stereo/en/index.m3u8\"
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"stereo\",NAME=\"Dubbing\",LANGUAGE=\"dub\",DEFAULT=NO,AUTOSELECT=YES,URI=\"audio/stereo/none/index.m3u8\"
#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=YES,URI=\"subtitles/en/index.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=628000,CODECS=\"avc1.42c00d,mp4a.40.2\",RESOLUTION=320x184,AUDIO=\"stereo\",SUBTITLES=\"subs\"
video/250kbit/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2149280,CODECS=\"avc1.64001f,mp4a.40.2\",RESOLUTION=1280x720,AUDIO=\"stereo\",SUBTITLES=\"subs\"
video/1500kbit/index.m3u8
";

fn round_trip(text: &str) -> (Playlist, Playlist) {
    let first = parse(text).expect("fixture parses");
    let second = parse(&generate(&first)).expect("generated text parses");
    (first, second)
}

#[test]
fn test_simple_vod_round_trip() {
    let (first, second) = round_trip(SIMPLE_VOD);
    assert_eq!(first, second);
    let media = first.as_media().unwrap();
    assert_eq!(media.segments.len(), 3);
    assert!((media.total_duration() - 21.5).abs() < 1e-9);
}

#[test]
fn test_encrypted_vod_round_trip_keeps_key_rotation() {
    let (first, second) = round_trip(ENCRYPTED_VOD);
    assert_eq!(first, second);
    let media = first.as_media().unwrap();
    assert!(media.segments[0].key.is_some());
    assert!(media.segments[1].key.is_none());
    assert!(media.segments[2].key.is_some());
}

#[test]
fn test_fmp4_round_trip_keeps_map_and_byterange() {
    let (first, second) = round_trip(FMP4_VOD);
    assert_eq!(first, second);
    let media = first.as_media().unwrap();
    assert_eq!(media.map.as_ref().unwrap().uri, "init.mp4");
    assert_eq!(media.segments[1].byte_range.as_deref(), Some("75232@0"));
    assert!(media.segments[2].discontinuity);
    assert!(media.segments[0].program_date_time.is_some());
}

#[test]
fn test_demuxed_master_round_trip() {
    let (first, second) = round_trip(DEMUXED_MASTER);
    assert_eq!(first, second);
    let master = first.as_master().unwrap();
    assert_eq!(master.variants.len(), 2);
    assert_eq!(master.audio_groups["stereo"].len(), 2);
    assert_eq!(master.subtitle_groups["subs"].len(), 1);
    assert!(master.independent_segments);
}

#[test]
fn test_segment_ordering_is_stable() {
    for fixture in [SIMPLE_VOD, ENCRYPTED_VOD, FMP4_VOD] {
        let first = parse(fixture).unwrap();
        let uris: Vec<_> = first
            .as_media()
            .unwrap()
            .segments
            .iter()
            .map(|s| s.uri.clone())
            .collect();
        let second = parse(&generate(&first)).unwrap();
        let reuris: Vec<_> = second
            .as_media()
            .unwrap()
            .segments
            .iter()
            .map(|s| s.uri.clone())
            .collect();
        assert_eq!(uris, reuris);
    }
}

#[test]
fn test_variant_uri_resolution() {
    let master = parse(DEMUXED_MASTER).unwrap();
    let variant = &master.as_master().unwrap().variants[1];
    assert_eq!(
        resolve_uri("https://cdn.example.com/movie/master.m3u8", &variant.uri),
        "https://cdn.example.com/movie/video/1500kbit/index.m3u8"
    );
}
