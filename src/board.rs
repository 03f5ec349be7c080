use ab_glyph::{point, Font, FontVec, PxScale};
use anyhow::{anyhow, bail, Context, Result};
use image::{Rgb, RgbImage};
use shakmaty::{Color, File, Piece, Rank, Role, Square};
use std::fs;
use std::path::Path;

use crate::game::BoardPosition;
use crate::BoardStyle;

/// Seam between the pipeline and whatever produces a board image. The frame
/// producer drives this once per position; tests substitute a recording fake.
pub trait RenderBoard {
    /// Render one position into the image file at `out`.
    fn render(&self, position: &BoardPosition, out: &Path) -> Result<()>;
}

/// Square and piece colors, parsed once from the configured hex strings.
#[derive(Debug, Clone)]
pub struct BoardTheme {
    pub light: Rgb<u8>,
    pub dark: Rgb<u8>,
    pub white_pieces: Rgb<u8>,
    pub black_pieces: Rgb<u8>,
}

impl BoardTheme {
    pub fn from_style(style: &BoardStyle) -> Result<Self> {
        Ok(Self {
            light: parse_hex_color(&style.light)?,
            dark: parse_hex_color(&style.dark)?,
            white_pieces: parse_hex_color(&style.white_pieces)?,
            black_pieces: parse_hex_color(&style.black_pieces)?,
        })
    }
}

impl Default for BoardTheme {
    fn default() -> Self {
        Self {
            light: Rgb([0xF0, 0xD9, 0xB5]),
            dark: Rgb([0xB5, 0x88, 0x63]),
            white_pieces: Rgb([0xFA, 0xFA, 0xFA]),
            black_pieces: Rgb([0x1C, 0x1C, 0x1C]),
        }
    }
}

/// Parse a `#RRGGBB` (or `RRGGBB`) color string.
pub fn parse_hex_color(s: &str) -> Result<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("invalid color '{}', expected #RRGGBB", s);
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

/// Draws one position as a PNG: 8x8 colored squares, white at the bottom,
/// piece glyphs from a configured TTF (Unicode chess glyphs) or from the
/// built-in letterforms when no font is set.
pub struct BoardPainter {
    size: u32,
    cell: u32,
    theme: BoardTheme,
    font: Option<FontVec>,
}

impl BoardPainter {
    /// `size` is the image edge in pixels. It must be divisible by 8 so the
    /// squares tile exactly, which also keeps it even for yuv420p output.
    pub fn new(size: u32, theme: BoardTheme) -> Result<Self> {
        if size < 64 || size % 8 != 0 {
            bail!("board size must be at least 64 and divisible by 8, got {size}");
        }
        Ok(Self {
            size,
            cell: size / 8,
            theme,
            font: None,
        })
    }

    /// Rasterize pieces from a TTF/OTF instead of the built-in letterforms.
    /// The font must cover the twelve Unicode chess glyphs.
    pub fn with_piece_font(mut self, path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("reading piece font {}", path.display()))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|_| anyhow!("{} is not a usable font file", path.display()))?;

        for color in [Color::White, Color::Black] {
            for role in ALL_ROLES {
                let ch = piece_char(Piece { color, role });
                if font.glyph_id(ch).0 == 0 {
                    bail!(
                        "font {} has no glyph for '{}' ({:?} {:?})",
                        path.display(),
                        ch,
                        color,
                        role
                    );
                }
            }
        }

        self.font = Some(font);
        Ok(self)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn fill_cell(&self, img: &mut RgbImage, file: u32, rank: u32, color: Rgb<u8>) {
        let x0 = file * self.cell;
        let y0 = (7 - rank) * self.cell;
        for y in y0..y0 + self.cell {
            for x in x0..x0 + self.cell {
                img.put_pixel(x, y, color);
            }
        }
    }

    fn draw_piece(&self, img: &mut RgbImage, piece: Piece, file: u32, rank: u32) {
        let (fill, shadow) = match piece.color {
            Color::White => (self.theme.white_pieces, self.theme.black_pieces),
            Color::Black => (self.theme.black_pieces, self.theme.white_pieces),
        };
        let x0 = file * self.cell;
        let y0 = (7 - rank) * self.cell;

        match &self.font {
            Some(font) => draw_font_glyph(img, font, piece_char(piece), x0, y0, self.cell, fill),
            None => draw_letter_glyph(img, letter_mask(piece.role), x0, y0, self.cell, fill, shadow),
        }
    }
}

impl RenderBoard for BoardPainter {
    fn render(&self, position: &BoardPosition, out: &Path) -> Result<()> {
        let mut img = RgbImage::from_pixel(self.size, self.size, self.theme.light);

        let board = position.board();
        for rank in 0..8u32 {
            for file in 0..8u32 {
                // a1 is a dark square; light when file + rank is odd.
                if (file + rank) % 2 == 0 {
                    self.fill_cell(&mut img, file, rank, self.theme.dark);
                }
                let square = Square::from_coords(File::new(file), Rank::new(rank));
                if let Some(piece) = board.piece_at(square) {
                    self.draw_piece(&mut img, piece, file, rank);
                }
            }
        }

        img.save(out)
            .with_context(|| format!("writing {}", out.display()))
    }
}

const ALL_ROLES: [Role; 6] = [
    Role::King,
    Role::Queen,
    Role::Rook,
    Role::Bishop,
    Role::Knight,
    Role::Pawn,
];

fn piece_char(piece: Piece) -> char {
    match (piece.color, piece.role) {
        (Color::White, Role::King) => '\u{2654}',
        (Color::White, Role::Queen) => '\u{2655}',
        (Color::White, Role::Rook) => '\u{2656}',
        (Color::White, Role::Bishop) => '\u{2657}',
        (Color::White, Role::Knight) => '\u{2658}',
        (Color::White, Role::Pawn) => '\u{2659}',
        (Color::Black, Role::King) => '\u{265A}',
        (Color::Black, Role::Queen) => '\u{265B}',
        (Color::Black, Role::Rook) => '\u{265C}',
        (Color::Black, Role::Bishop) => '\u{265D}',
        (Color::Black, Role::Knight) => '\u{265E}',
        (Color::Black, Role::Pawn) => '\u{265F}',
    }
}

// 7x8 letterforms, one bit per pixel, leftmost pixel in bit 6.
const GLYPH_WIDTH: u32 = 7;
const GLYPH_HEIGHT: u32 = 8;

fn letter_mask(role: Role) -> &'static [u8; 8] {
    match role {
        Role::King => &[
            0b1000010, 0b1000100, 0b1001000, 0b1110000, 0b1110000, 0b1001000, 0b1000100, 0b1000010,
        ],
        Role::Queen => &[
            0b0111100, 0b1000010, 0b1000010, 0b1000010, 0b1000010, 0b1001010, 0b0111100, 0b0000010,
        ],
        Role::Rook => &[
            0b1111100, 0b1000010, 0b1000010, 0b1111100, 0b1001000, 0b1000100, 0b1000010, 0b1000010,
        ],
        Role::Bishop => &[
            0b1111100, 0b1000010, 0b1000010, 0b1111100, 0b1000010, 0b1000010, 0b1000010, 0b1111100,
        ],
        Role::Knight => &[
            0b1000010, 0b1100010, 0b1010010, 0b1010010, 0b1001010, 0b1001010, 0b1000110, 0b1000010,
        ],
        Role::Pawn => &[
            0b1111100, 0b1000010, 0b1000010, 0b1111100, 0b1000000, 0b1000000, 0b1000000, 0b1000000,
        ],
    }
}

fn draw_letter_glyph(
    img: &mut RgbImage,
    mask: &[u8; 8],
    x0: u32,
    y0: u32,
    cell: u32,
    fill: Rgb<u8>,
    shadow: Rgb<u8>,
) {
    let scale = ((cell * 3 / 4) / GLYPH_HEIGHT).max(1);
    let glyph_w = GLYPH_WIDTH * scale;
    let glyph_h = GLYPH_HEIGHT * scale;
    let ox = x0 + cell.saturating_sub(glyph_w) / 2;
    let oy = y0 + cell.saturating_sub(glyph_h) / 2;
    let offset = (scale / 3).max(1);

    for (pass, color) in [(offset, shadow), (0, fill)] {
        for (row, bits) in mask.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px0 = ox + col * scale + pass;
                let py0 = oy + row as u32 * scale + pass;
                for py in py0..py0 + scale {
                    for px in px0..px0 + scale {
                        if px < img.width() && py < img.height() {
                            img.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
    }
}

fn draw_font_glyph(
    img: &mut RgbImage,
    font: &FontVec,
    ch: char,
    x0: u32,
    y0: u32,
    cell: u32,
    fill: Rgb<u8>,
) {
    let scale = PxScale::from(cell as f32 * 0.85);
    let glyph = font.glyph_id(ch).with_scale_and_position(scale, point(0.0, 0.0));
    let Some(outlined) = font.outline_glyph(glyph) else {
        return;
    };

    let bounds = outlined.px_bounds();
    let w = (bounds.max.x - bounds.min.x).ceil() as u32;
    let h = (bounds.max.y - bounds.min.y).ceil() as u32;
    let ox = x0 + cell.saturating_sub(w) / 2;
    let oy = y0 + cell.saturating_sub(h) / 2;

    outlined.draw(|gx, gy, coverage| {
        let px = ox + gx;
        let py = oy + gy;
        if coverage > 0.0 && px < img.width() && py < img.height() {
            let base = *img.get_pixel(px, py);
            img.put_pixel(px, py, blend(base, fill, coverage.min(1.0)));
        }
    });
}

fn blend(base: Rgb<u8>, top: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix =
        |b: u8, t: u8| -> u8 { (b as f32 + (t as f32 - b as f32) * alpha).round().clamp(0.0, 255.0) as u8 };
    Rgb([
        mix(base[0], top[0]),
        mix(base[1], top[1]),
        mix(base[2], top[2]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::parse_game;
    use crate::test_support::TempDir;

    #[test]
    fn hex_colors_parse_with_and_without_hash() {
        assert_eq!(parse_hex_color("#F0D9B5").unwrap(), Rgb([0xF0, 0xD9, 0xB5]));
        assert_eq!(parse_hex_color("b58863").unwrap(), Rgb([0xB5, 0x88, 0x63]));
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("not-a-color").is_err());
    }

    #[test]
    fn painter_rejects_sizes_that_do_not_tile() {
        assert!(BoardPainter::new(100, BoardTheme::default()).is_err());
        assert!(BoardPainter::new(63, BoardTheme::default()).is_err());
        assert!(BoardPainter::new(64, BoardTheme::default()).is_ok());
        assert!(BoardPainter::new(720, BoardTheme::default()).is_ok());
    }

    #[test]
    fn render_writes_png_with_configured_size() {
        let dir = TempDir::new("board_render");
        let out = dir.path().join("frame_0.png");
        let game = parse_game("1. e4").unwrap();

        let painter = BoardPainter::new(64, BoardTheme::default()).unwrap();
        painter.render(&game.positions[0], &out).unwrap();

        assert_eq!(image::image_dimensions(&out).unwrap(), (64, 64));
    }

    #[test]
    fn every_role_has_a_nonempty_letterform() {
        for role in ALL_ROLES {
            assert!(
                letter_mask(role).iter().any(|row| *row != 0),
                "{role:?} has an empty mask"
            );
        }
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let painter = BoardPainter::new(64, BoardTheme::default()).unwrap();
        assert!(painter
            .with_piece_font(Path::new("/nonexistent/pieces.ttf"))
            .is_err());
    }
}
